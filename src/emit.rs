//! Buffered Bmad output.
//!
//! Output targets are a stack: `call` in multi-file mode pushes a new target,
//! end-of-file or `return` pops one. Lines are buffered so the finalizer can
//! prepend the provenance header, hoisted variables, and superposition
//! directives without re-reading anything from disk.

const MAX_LINE: usize = 120;
const CONT_INDENT: &str = "         ";

/// One output file being accumulated.
#[derive(Debug)]
pub struct OutFile {
    pub name: String,
    pub lines: Vec<String>,
}

/// Largest index ≤ `at` that is a char boundary of `s`.
fn floor_boundary(s: &str, at: usize) -> usize {
    let mut at = at.min(s.len());
    while !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

impl OutFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    /// Append one line verbatim.
    pub fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    pub fn blank_line(&mut self) {
        self.lines.push(String::new());
    }

    /// Append a line, soft-wrapping at 120 columns. The break lands on the
    /// last comma inside the limit (no continuation marker needed after a
    /// comma), else on the last space or arithmetic operator with a trailing
    /// ` &`. Continuation lines are indented nine spaces.
    pub fn wrap_write(&mut self, line: &str) {
        let mut tab = "";
        let mut rest = line.trim_end().to_string();

        loop {
            if rest.len() <= MAX_LINE + 1 {
                self.lines.push(format!("{}{}", tab, rest));
                return;
            }

            let head = &rest[..floor_boundary(&rest, MAX_LINE)];
            let ix = if let Some(ix) = head.rfind(',') {
                self.lines.push(format!("{}{}", tab, &rest[..=ix]));
                ix
            } else {
                let mut found = None;
                for ch in [' ', '-', '+', '/', '*'] {
                    if let Some(ix) = head.rfind(ch) {
                        found = Some(ix);
                        break;
                    }
                }
                match found {
                    Some(ix) => {
                        self.lines.push(format!("{}{} &", tab, &rest[..=ix]));
                        ix
                    }
                    None => {
                        // Nothing to break on; emit unbroken.
                        self.lines.push(format!("{}{}", tab, rest));
                        return;
                    }
                }
            };

            tab = CONT_INDENT;
            rest = rest[ix + 1..].to_string();
        }
    }

    pub fn contents(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Stack of output targets. The bottom entry is the root Bmad file.
#[derive(Debug)]
pub struct OutputStack {
    stack: Vec<OutFile>,
    finished: Vec<OutFile>,
}

impl OutputStack {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            stack: vec![OutFile::new(root_name)],
            finished: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.stack.push(OutFile::new(name));
    }

    /// Close the top target; its buffered lines are kept for the final
    /// write-out.
    pub fn pop(&mut self) {
        if let Some(out) = self.stack.pop() {
            self.finished.push(out);
        }
    }

    pub fn top(&mut self) -> &mut OutFile {
        // Keeps writes well-defined even after the root target was closed by
        // an `exit` in multi-file mode.
        if self.stack.is_empty() {
            self.stack.push(OutFile::new("scratch"));
        }
        let ix = self.stack.len() - 1;
        &mut self.stack[ix]
    }

    /// All accumulated files, root first.
    pub fn finish(mut self) -> Vec<OutFile> {
        while let Some(out) = self.stack.pop() {
            self.finished.push(out);
        }
        self.finished.reverse();
        self.finished
    }
}

/// Second pass over the root output: provenance header, hoisted variable
/// assignments, superposition directives, then the translated body.
pub fn finalize(
    body: &OutFile,
    madx_file: &str,
    set_list: &[(String, String)],
    super_list: &[String],
    prepend_vars: bool,
) -> String {
    let mut out = OutFile::new(&body.name);
    out.write_line("!+");
    out.write_line("! Translated from MADX to Bmad by madx2bmad");
    out.write_line(&format!("! File: {}", madx_file));
    out.write_line("!-");
    out.blank_line();

    if prepend_vars && !set_list.is_empty() {
        for (name, value) in set_list {
            out.wrap_write(&format!("{} = {}", name, value));
        }
        out.blank_line();
    }

    if !super_list.is_empty() {
        for line in super_list {
            out.write_line(line);
        }
        out.blank_line();
    }

    out.lines.extend(body.lines.iter().cloned());
    out.contents()
}
