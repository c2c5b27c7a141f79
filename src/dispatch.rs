//! The translation driver: owns all state and dispatches assembled commands.

use indexmap::IndexMap;
use std::io;

use crate::command::{classify_control, classify_main, Command};
use crate::diagnostic::Diagnostic;
use crate::element::{
    build_element, definition_line, parameter_dictionary, Element, ElementTable,
};
use crate::emit::{finalize, OutputStack};
use crate::expr::{add_parens, bmad_expression, bmad_param};
use crate::lexeme::{join_tokens, Lexeme};
use crate::reader::InputStack;
use crate::scan::{Scanner, Statement};
use crate::sequence::Sequence;
use crate::bmad_file_name;

/// Command-line surface of the translator.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Dump the token list of every assembled command.
    pub debug: bool,
    /// Hoist variable assignments to the top of the output file.
    pub prepend_vars: bool,
    /// Use `superimpose` directives instead of line-with-drift flattening.
    pub superimpose: bool,
    /// Concatenate all output into one Bmad file (vs one per input file).
    pub one_file: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug: false,
            prepend_vars: true,
            superimpose: false,
            one_file: true,
        }
    }
}

/// Translation context: input and output stacks, the element and sequence
/// dictionaries, and the lists collected for the finalization pass.
pub struct Translator {
    pub(crate) opts: Options,
    madx_file: String,
    root_out: String,
    input: InputStack,
    pub(crate) out: OutputStack,
    scanner: Scanner,
    pub(crate) elements: ElementTable,
    pub(crate) sequences: IndexMap<String, Sequence>,
    pub(crate) cur_seq: Option<Sequence>,
    seqedit_name: String,
    use_target: String,
    set_list: Vec<(String, String)>,
    var_names: Vec<String>,
    pub(crate) super_list: Vec<String>,
}

impl Translator {
    fn new(madx_file: &str, input: InputStack, opts: Options) -> Self {
        let root_out = bmad_file_name(madx_file);
        Self {
            opts,
            madx_file: madx_file.to_string(),
            root_out: root_out.clone(),
            input,
            out: OutputStack::new(root_out),
            scanner: Scanner::new(),
            elements: ElementTable::new(),
            sequences: IndexMap::new(),
            cur_seq: None,
            seqedit_name: String::new(),
            use_target: String::new(),
            set_list: Vec::new(),
            var_names: Vec::new(),
            super_list: Vec::new(),
        }
    }

    pub fn from_file(madx_file: &str, opts: Options) -> io::Result<Self> {
        let mut input = InputStack::new();
        input.push_file(madx_file)?;
        Ok(Self::new(madx_file, input, opts))
    }

    pub fn from_string(name: &str, source: &str, opts: Options) -> Self {
        let mut input = InputStack::new();
        input.push_string(name, source);
        Self::new(name, input, opts)
    }

    /// Translate until the root input is exhausted or a stop command pops it.
    pub fn run(&mut self) {
        loop {
            let st = match self.scanner.next_statement(
                &mut self.input,
                &mut self.out,
                self.opts.one_file,
            ) {
                Some(st) => st,
                None => break,
            };
            if self.opts.debug {
                eprintln!("tokens: {:?}", st.tokens);
            }
            self.dispatch(&st);
            if self.input.is_empty() {
                break;
            }
        }
    }

    /// Finished output files as `(name, contents)`, root (finalized) first.
    pub fn finish(self) -> Vec<(String, String)> {
        let files = self.out.finish();
        let mut result = Vec::new();
        for file in &files {
            if file.name == self.root_out {
                let contents = finalize(
                    file,
                    &self.madx_file,
                    &self.set_list,
                    &self.super_list,
                    self.opts.prepend_vars,
                );
                result.insert(0, (file.name.clone(), contents));
            } else {
                result.push((file.name.clone(), file.contents()));
            }
        }
        result
    }

    pub(crate) fn diag(&self, d: Diagnostic) {
        let origin = self.input.current_name().unwrap_or(&self.madx_file);
        d.render(origin);
    }

    /// Report a diagnostic, attaching the offending command when the
    /// producer did not.
    pub(crate) fn diag_cmd(&self, d: Diagnostic, command: &str) {
        if d.command.is_some() {
            self.diag(d);
        } else {
            self.diag(d.with_command(command.trim()));
        }
    }

    fn dispatch(&mut self, st: &Statement) {
        if st.tokens.is_empty() {
            self.out.top().blank_line();
            return;
        }

        if let Some(cmd) = classify_control(&st.tokens) {
            return self.exec_control(cmd, st);
        }

        if self.cur_seq.is_some() {
            return self.sequence_member(st);
        }

        let cmd = classify_main(&st.tokens, &self.elements);
        self.exec_main(cmd, st);
    }

    fn exec_control(&mut self, cmd: Command, st: &Statement) {
        match cmd {
            Command::ControlFlow(name) => self.diag_cmd(
                Diagnostic::warning(format!("\"{}\" command ignored", name)).with_note(
                    "the translated Bmad lattice is likely to differ from the MADX lattice",
                ),
                &st.text,
            ),

            Command::Skip => {}

            Command::Unsupported(name) => self.diag_cmd(
                Diagnostic::warning(format!("cannot translate the command: {}", name)),
                &st.text,
            ),

            Command::SeqeditStart => {
                let (params, _) = parameter_dictionary(param_tokens(&st.tokens, 2));
                self.seqedit_name = params
                    .get("sequence")
                    .cloned()
                    .or_else(|| st.tokens.get(4).map(|t| t.text().to_string()))
                    .unwrap_or_default();
            }

            Command::SeqeditEnd => self.seqedit_name.clear(),

            Command::Install => self.exec_install(st),

            Command::Return => {
                self.input.pop();
                if self.opts.one_file {
                    if let Some(name) = self.input.current_name() {
                        let name = name.to_string();
                        self.out.top().blank_line();
                        self.out
                            .top()
                            .write_line(&format!("! Returned to File: {}", name));
                    }
                } else {
                    self.out.pop();
                }
            }

            Command::Exit => {
                self.input.pop();
                if !self.opts.one_file {
                    self.out.pop();
                }
            }

            Command::Title => {
                if st.tokens.len() > 1 {
                    if st.tokens[1] == Lexeme::Comma {
                        self.out.top().write_line(st.text.trim());
                    } else {
                        // MADX accepts "title'abc'"; Bmad needs the comma.
                        let title = st.tokens[1].text().to_string();
                        self.out.top().write_line(&format!("title, {}", title));
                    }
                }
            }

            Command::EndSequence => self.end_sequence(),

            Command::SequenceStart => self.start_sequence(st),

            Command::ShortUnknown => self.diag_cmd(Diagnostic::error("unknown construct"), &st.text),

            _ => {}
        }
    }

    fn exec_main(&mut self, cmd: Command, st: &Statement) {
        match cmd {
            Command::LineDef => {
                let text = st.text.trim().to_string();
                self.out.top().wrap_write(&text);
            }

            Command::VarAssign { name } => self.exec_var_assign(&name, st),

            Command::AttrAssign { ele, param } => {
                let value = bmad_expression(after_eq(&st.text), &param, &self.elements);
                let bmad = bmad_param(&param, &ele, &self.elements);
                self.out
                    .top()
                    .write_line(&format!("{}[{}] = {}", ele, bmad, value));
            }

            Command::Call => self.exec_call(st),

            Command::Use => {
                if st.tokens.len() == 3 {
                    self.use_target = st.tokens[2].text().to_string();
                } else {
                    let (params, _) = parameter_dictionary(&st.tokens[2..]);
                    if let Some(seq) = params.get("sequence") {
                        self.use_target = seq.clone();
                    }
                    if let Some(period) = params.get("period") {
                        self.use_target = period.clone();
                    }
                }
                let line = format!("use, {}", self.use_target);
                self.out.top().write_line(&line);
            }

            Command::Beam => self.exec_beam(st),

            Command::Twiss { skip } => self.exec_twiss(st, skip),

            Command::EleParamSet { ele, param } => {
                let value = bmad_expression(&join_tokens(&st.tokens[4..]), &param, &self.elements);
                let bmad = bmad_param(&param, &ele, &self.elements);
                self.out
                    .top()
                    .write_line(&format!("{}[{}] = {}", ele, bmad, value));
            }

            Command::ElementDef => {
                let _ = self.parse_and_register(&st.tokens, true, &st.text);
            }

            Command::Unknown => self.diag_cmd(Diagnostic::error("unknown construct"), &st.text),

            _ => {}
        }
    }

    /// Build an element definition, register it (first definition wins), and
    /// optionally emit its Bmad line.
    pub(crate) fn parse_and_register(
        &mut self,
        tokens: &[Lexeme],
        write: bool,
        command_text: &str,
    ) -> Option<Element> {
        let (ele, diags) = build_element(tokens, &self.elements);
        for d in diags {
            self.diag_cmd(d, command_text);
        }
        let ele = ele?;
        if !self.elements.contains_key(&ele.name) {
            self.elements.insert(ele.name.clone(), ele.clone());
        }
        if write {
            let line = definition_line(&ele, &self.elements);
            self.out.top().wrap_write(&line);
        }
        Some(ele)
    }

    fn exec_var_assign(&mut self, name: &str, st: &Statement) {
        if self.var_names.iter().any(|n| n == name) {
            self.diag_cmd(
                Diagnostic::warning(format!("duplicate variable name: {}", name))
                    .with_help("resolve the clash by editing the Bmad lattice file by hand"),
                &st.text,
            );
        }
        self.var_names.push(name.to_string());

        let value = bmad_expression(after_eq(&st.text), name, &self.elements);
        // Values referencing element attributes must stay in place; hoisting
        // them above the element definitions would break them.
        if value.contains('[') || !self.opts.prepend_vars {
            self.out.top().write_line(&format!("{} = {}", name, value));
        } else {
            self.set_list.push((name.to_string(), value));
        }
    }

    fn exec_install(&mut self, st: &Statement) {
        let (params, problem) = parameter_dictionary(param_tokens(&st.tokens, 2));
        if let Some(problem) = problem {
            self.diag_cmd(problem, &st.text);
        }
        let Some(element) = params.get("element") else {
            self.diag_cmd(
                Diagnostic::error("install needs an \"element\" parameter"),
                &st.text,
            );
            return;
        };
        if let Some(class) = params.get("class") {
            self.out.top().write_line(&format!("{}: {}", element, class));
        }
        let at = params.get("at").map(String::as_str).unwrap_or("0");
        let reference = match params.get("from") {
            Some(from) => from.clone(),
            None => format!("{}_mark", self.seqedit_name),
        };
        self.out.top().write_line(&format!(
            "superimpose, element = {}, ref = {}, offset = {}",
            element, reference, at
        ));
    }

    fn exec_call(&mut self, st: &Statement) {
        let Some((_, rest)) = st.text.split_once('=') else {
            self.diag_cmd(Diagnostic::error("malformed call command"), &st.text);
            return;
        };
        let raw = rest.trim();
        // A quoted file name keeps its case; a bare one is folded.
        let file = if raw.contains('"') || raw.contains('\'') {
            raw.replace(['"', '\''], "")
        } else {
            raw.to_lowercase()
        };

        if let Err(e) = self.input.push_file(&file) {
            self.diag_cmd(
                Diagnostic::error(format!("cannot open called file \"{}\": {}", file, e)),
                &st.text,
            );
            return;
        }

        if self.opts.one_file {
            self.out.top().blank_line();
            self.out.top().write_line(&format!("! In File: {}", file));
        } else {
            let bmad = bmad_file_name(&file);
            self.out
                .top()
                .write_line(&format!("call, file = {}", bmad));
            self.out.push(bmad);
        }
    }

    fn exec_beam(&mut self, st: &Statement) {
        let (params, problem) = parameter_dictionary(param_tokens(&st.tokens, 2));
        if let Some(problem) = problem {
            self.diag_cmd(problem, &st.text);
        }
        if let Some(v) = params.get("particle") {
            let value = bmad_expression(v, "", &self.elements);
            self.out
                .top()
                .write_line(&format!("parameter[particle] = {}", value));
        }
        if let Some(v) = params.get("energy") {
            let value = bmad_expression(v, "energy", &self.elements);
            self.out
                .top()
                .write_line(&format!("parameter[E_tot] = {}", value));
        }
        if let Some(v) = params.get("pc") {
            let value = bmad_expression(v, "pc", &self.elements);
            self.out
                .top()
                .write_line(&format!("parameter[p0c] = {}", value));
        }
        if let Some(v) = params.get("gamma") {
            let value = add_parens(&bmad_expression(v, "", &self.elements), false);
            self.out.top().write_line(&format!(
                "parameter[E_tot] = mass_of(parameter[particle]) * {}",
                value
            ));
        }
        if let Some(v) = params.get("npart") {
            let value = bmad_expression(v, "", &self.elements);
            self.out
                .top()
                .write_line(&format!("parameter[n_part] = {}", value));
        }
    }

    fn exec_twiss(&mut self, st: &Statement, skip: usize) {
        let (params, problem) = parameter_dictionary(param_tokens(&st.tokens, skip));
        if let Some(problem) = problem {
            self.diag_cmd(problem, &st.text);
        }

        // (madx key, bmad target, phase advance in units of 2π)
        const TWISS_KEYS: &[(&str, &str, bool)] = &[
            ("betx", "beginning[beta_a]", false),
            ("bety", "beginning[beta_b]", false),
            ("alfx", "beginning[alpha_a]", false),
            ("alfy", "beginning[alpha_b]", false),
            ("mux", "beginning[phi_a]", true),
            ("muy", "beginning[phi_b]", true),
            ("dx", "beginning[eta_x]", false),
            ("dy", "beginning[eta_y]", false),
            ("dpx", "beginning[etap_x]", false),
            ("dpy", "beginning[etap_y]", false),
            ("x", "particle_start[x]", false),
            ("y", "particle_start[y]", false),
            ("px", "particle_start[px]", false),
            ("py", "particle_start[py]", false),
        ];

        for (madx, target, tune) in TWISS_KEYS {
            let Some(v) = params.get(*madx) else {
                continue;
            };
            let value = bmad_expression(v, "", &self.elements);
            let line = if *tune {
                format!("{} = twopi * {}", target, add_parens(&value, false))
            } else {
                format!("{} = {}", target, value)
            };
            self.out.top().write_line(&line);
        }
    }
}

/// Everything after the first `=` of the command text, trimmed.
fn after_eq(text: &str) -> &str {
    text.split_once('=').map(|(_, rest)| rest).unwrap_or("").trim()
}

/// The parameter tokens of a command, starting at `skip`.
fn param_tokens(tokens: &[Lexeme], skip: usize) -> &[Lexeme] {
    if tokens.len() > skip {
        &tokens[skip..]
    } else {
        &[]
    }
}
