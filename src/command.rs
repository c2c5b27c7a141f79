//! Statement classification.
//!
//! Classification happens in two stages, mirroring dispatch order: control
//! commands are recognized first and dispatch even inside a sequence body;
//! everything else is either a sequence member (when a sequence is open) or
//! one of the main statement shapes.

use crate::element::ElementTable;
use crate::lexeme::Lexeme;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `if` / `elseif` / `else` / `while` / `exec` / macro bodies: skipped,
    /// with a warning for the ones that change lattice meaning.
    ControlFlow(String),
    /// Commands with no Bmad counterpart that are silently dropped.
    Skip,
    /// Sequence-editing operations that cannot be translated.
    Unsupported(String),
    SeqeditStart,
    SeqeditEnd,
    Install,
    Return,
    Exit,
    Title,
    EndSequence,
    SequenceStart,
    /// Fewer than three tokens and not a recognized keyword.
    ShortUnknown,

    LineDef,
    VarAssign { name: String },
    AttrAssign { ele: String, param: String },
    Call,
    Use,
    Beam,
    /// `twiss, ...` or `name: beta0, ...`; `skip` is where the parameter
    /// tokens start.
    Twiss { skip: usize },
    EleParamSet { ele: String, param: String },
    ElementDef,
    Unknown,
}

const SILENT_SKIP: &[&str] = &[
    "aperture", "show", "value", "efcomp", "print", "select", "optics", "option", "survey",
    "emit", "help", "set", "eoption", "system", "ealign", "sixtrack", "flatten", "elseif", "else",
];

const UNSUPPORTED: &[&str] = &["cycle", "reflect", "move", "remove", "replace", "extract"];

/// First-stage classification: commands dispatched even while a sequence is
/// open. Returns `None` for statements subject to sequence-member handling.
pub fn classify_control(tokens: &[Lexeme]) -> Option<Command> {
    let first = tokens.first().and_then(|t| t.word()).unwrap_or("");

    if matches!(first, "exec" | "while" | "if") {
        return Some(Command::ControlFlow(first.to_string()));
    }
    if SILENT_SKIP.contains(&first) || tokens.iter().any(|t| t.is_word("macro")) {
        return Some(Command::Skip);
    }
    if UNSUPPORTED.contains(&first) {
        return Some(Command::Unsupported(first.to_string()));
    }

    match first {
        "seqedit" => return Some(Command::SeqeditStart),
        "endedit" => return Some(Command::SeqeditEnd),
        "install" => return Some(Command::Install),
        "return" => return Some(Command::Return),
        "exit" | "quit" | "stop" => return Some(Command::Exit),
        "title" => return Some(Command::Title),
        "endsequence" => return Some(Command::EndSequence),
        _ => {}
    }

    if tokens.len() < 3 {
        return Some(Command::ShortUnknown);
    }

    if tokens[1] == Lexeme::Colon && tokens[2].is_word("sequence") {
        return Some(Command::SequenceStart);
    }

    None
}

/// Second-stage classification for statements outside any sequence.
pub fn classify_main(tokens: &[Lexeme], elements: &ElementTable) -> Command {
    let first = tokens[0].text();

    if let Some(ix) = tokens.iter().position(|t| *t == Lexeme::Colon) {
        if ix > 0 && tokens.get(ix + 1).is_some_and(|t| t.is_word("line")) {
            return Command::LineDef;
        }
    }

    if tokens[1] == Lexeme::Eq {
        return match first.split_once("->") {
            Some((ele, param)) => Command::AttrAssign {
                ele: ele.to_string(),
                param: param.to_string(),
            },
            None => Command::VarAssign {
                name: first.to_string(),
            },
        };
    }

    match first {
        "call" => return Command::Call,
        "use" => return Command::Use,
        "beam" => return Command::Beam,
        "twiss" => return Command::Twiss { skip: 2 },
        _ => {}
    }

    if tokens[2].is_word("beta0") {
        return Command::Twiss { skip: 4 };
    }

    if tokens.len() > 4
        && tokens[1] == Lexeme::Comma
        && tokens[3] == Lexeme::Eq
        && tokens[0].word().is_some_and(|w| elements.contains_key(w))
    {
        return Command::EleParamSet {
            ele: first.to_string(),
            param: tokens[2].text().to_string(),
        };
    }

    if tokens[1] == Lexeme::Colon {
        return Command::ElementDef;
    }

    Command::Unknown
}
