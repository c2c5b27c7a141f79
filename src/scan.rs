//! Streaming command assembly.
//!
//! MADX statements end at `;`, except `if`/`elseif`/`else`/`while` bodies and
//! macro definitions, which end at the `}` that balances the brace depth.
//! Comments and blank lines are echoed to the current output as they are
//! read, so their placement in the Bmad file tracks the source.

use crate::emit::OutputStack;
use crate::lexeme::Lexeme;
use crate::reader::InputStack;

/// One assembled command: the joined source text plus its token list.
#[derive(Clone, Debug)]
pub struct Statement {
    pub text: String,
    pub tokens: Vec<Lexeme>,
}

/// Persistent scanner state between commands.
#[derive(Default)]
pub struct Scanner {
    /// Remainder of a line after a command terminator.
    pending: String,
    /// A `/* ... */` comment left open on a previous line.
    in_block_comment: bool,
}

fn flush_word(word: &mut String, tokens: &mut Vec<Lexeme>) {
    let trimmed = word.trim();
    if !trimmed.is_empty() {
        tokens.push(Lexeme::Word(trimmed.to_lowercase()));
    }
    word.clear();
}

/// True while the command in progress terminates at a balancing `}` rather
/// than at `;`.
fn brace_terminated(tokens: &[Lexeme]) -> bool {
    let head = matches!(tokens.first(),
        Some(Lexeme::Word(w)) if matches!(w.as_str(), "if" | "elseif" | "else" | "while"));
    head || tokens.iter().any(|t| t.is_word("macro"))
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the next command. Returns `None` once the root input source
    /// is exhausted (a partial trailing command is dropped).
    pub fn next_statement(
        &mut self,
        input: &mut InputStack,
        out: &mut OutputStack,
        one_file: bool,
    ) -> Option<Statement> {
        let mut text = String::new();
        let mut tokens: Vec<Lexeme> = Vec::new();
        let mut word = String::new();
        let mut quote: Option<char> = None;
        let mut quoted = String::new();
        let mut depth: i32 = 0;

        loop {
            let raw = if self.pending.is_empty() {
                loop {
                    match input.read_line() {
                        Some(line) => break line,
                        None => {
                            input.pop();
                            if !one_file {
                                out.pop();
                            }
                            if input.is_empty() {
                                return None;
                            }
                        }
                    }
                }
            } else {
                std::mem::take(&mut self.pending)
            };

            let line = raw.trim().to_string();

            if line.is_empty() {
                out.top().blank_line();
                continue;
            }

            // "#!madx" shebang-style first lines pass through as comments.
            if line.starts_with("#!") {
                out.top().write_line(&format!("! {}", line));
                continue;
            }

            let mut line = line;
            if self.in_block_comment {
                match line.find("*/") {
                    Some(ix) => {
                        out.top().write_line(&format!("! {}", &line[..ix]));
                        self.in_block_comment = false;
                        line = line[ix + 2..].trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                    }
                    None => {
                        out.top().write_line(&format!("! {}", line));
                        continue;
                    }
                }
            }

            let chars: Vec<(usize, char)> = line.char_indices().collect();
            let mut i = 0;
            while i < chars.len() {
                let (bi, ch) = chars[i];
                let next = chars.get(i + 1).map(|&(_, c)| c);

                if let Some(q) = quote {
                    quoted.push(ch);
                    text.push(ch);
                    if ch == q {
                        tokens.push(Lexeme::Quoted(std::mem::take(&mut quoted)));
                        quote = None;
                    }
                    i += 1;
                    continue;
                }

                match ch {
                    '\'' | '"' => {
                        flush_word(&mut word, &mut tokens);
                        quote = Some(ch);
                        quoted.push(ch);
                        text.push(ch);
                        i += 1;
                    }

                    '!' => {
                        // Line comment; `!!verbatim` passes its payload
                        // through untouched.
                        flush_word(&mut word, &mut tokens);
                        let rest = &line[bi..];
                        if let Some(payload) = rest.strip_prefix("!!verbatim") {
                            out.top().write_line(payload.trim());
                        } else {
                            out.top().write_line(rest);
                        }
                        break;
                    }

                    '/' if next == Some('*') => {
                        flush_word(&mut word, &mut tokens);
                        let body_start = bi + 2;
                        match line[body_start..].find("*/") {
                            Some(pos) => {
                                out.top().write_line(&format!(
                                    "!{}",
                                    &line[body_start..body_start + pos]
                                ));
                                let resume = body_start + pos + 2;
                                while i < chars.len() && chars[i].0 < resume {
                                    i += 1;
                                }
                            }
                            None => {
                                out.top().write_line(&format!("!{}", &line[body_start..]));
                                self.in_block_comment = true;
                                break;
                            }
                        }
                    }

                    '/' if next == Some('/') => {
                        flush_word(&mut word, &mut tokens);
                        out.top().write_line(&format!("!{}", &line[bi + 2..]));
                        break;
                    }

                    ';' if !brace_terminated(&tokens) => {
                        flush_word(&mut word, &mut tokens);
                        self.pending = line[bi + 1..].to_string();
                        return Some(self.finish(text, tokens));
                    }

                    '{' => {
                        depth += 1;
                        flush_word(&mut word, &mut tokens);
                        tokens.push(Lexeme::LBrace);
                        text.push(ch);
                        i += 1;
                    }

                    '}' => {
                        depth -= 1;
                        if depth == 0 && brace_terminated(&tokens) {
                            flush_word(&mut word, &mut tokens);
                            self.pending = line[bi + 1..].to_string();
                            return Some(self.finish(text, tokens));
                        }
                        flush_word(&mut word, &mut tokens);
                        tokens.push(Lexeme::RBrace);
                        text.push(ch);
                        i += 1;
                    }

                    ':' | ',' | '=' => {
                        flush_word(&mut word, &mut tokens);
                        tokens.push(match ch {
                            ':' => Lexeme::Colon,
                            ',' => Lexeme::Comma,
                            _ => Lexeme::Eq,
                        });
                        text.push(ch);
                        i += 1;
                    }

                    // `if(` / `while(` need a split at the head of the
                    // command; parentheses elsewhere stay inside words.
                    '(' if tokens.is_empty() => {
                        flush_word(&mut word, &mut tokens);
                        tokens.push(Lexeme::LParen);
                        text.push(ch);
                        i += 1;
                    }

                    _ => {
                        word.push(ch);
                        text.push(ch);
                        i += 1;
                    }
                }
            }

            // Tokens never span lines.
            flush_word(&mut word, &mut tokens);
        }
    }

    fn finish(&mut self, text: String, mut tokens: Vec<Lexeme>) -> Statement {
        // Strip "real"/"int"/"const"/"const real"/"shared" type qualifiers
        // from the head token.
        if let Some(Lexeme::Word(w)) = tokens.first_mut() {
            for _ in 0..2 {
                for prefix in ["real ", "int ", "const "] {
                    if let Some(rest) = w.strip_prefix(prefix) {
                        *w = rest.trim().to_string();
                    }
                }
            }
            if let Some(rest) = w.strip_prefix("shared ") {
                *w = rest.trim().to_string();
            }
        }

        // ":=" is plain assignment.
        let mut ix = 0;
        while ix + 1 < tokens.len() {
            if tokens[ix] == Lexeme::Colon && tokens[ix + 1] == Lexeme::Eq {
                tokens.remove(ix);
            } else {
                ix += 1;
            }
        }

        // MADX lets commas be omitted ("q: quadrupole l = 7"); synthesize
        // them between space-joined words so both spellings parse alike.
        // Words holding arithmetic are expression text and stay whole.
        let mut normalized = Vec::with_capacity(tokens.len());
        for tok in tokens {
            match tok {
                Lexeme::Word(w)
                    if w.contains(' ') && !w.contains(['"', '\'', '+', '-', '*', '/', '^']) =>
                {
                    for (n, piece) in w.split_whitespace().enumerate() {
                        if n > 0 {
                            normalized.push(Lexeme::Comma);
                        }
                        normalized.push(Lexeme::Word(piece.to_string()));
                    }
                }
                other => normalized.push(other),
            }
        }

        Statement {
            text,
            tokens: normalized,
        }
    }
}
