/// A translator diagnostic (warning or error).
///
/// Every diagnostic is recoverable: the translator reports it and keeps
/// going. The offending MADX command, when known, is attached so the report
/// can show it.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub command: Option<String>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            command: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            command: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render the diagnostic to stderr using ariadne. The assembled command
    /// text stands in for a source file; `origin` names the input file it
    /// came from.
    pub fn render(&self, origin: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let command = match &self.command {
            Some(c) => c.trim().to_string(),
            None => {
                // No command context: a plain one-line report.
                match self.severity {
                    Severity::Error => eprintln!("error: {}", self.message),
                    Severity::Warning => eprintln!("warning: {}", self.message),
                }
                for note in &self.notes {
                    eprintln!("  note: {}", note);
                }
                if let Some(help) = &self.help {
                    eprintln!("  help: {}", help);
                }
                return;
            }
        };

        let mut report = Report::build(kind, origin, 0)
            .with_message(&self.message)
            .with_label(
                Label::new((origin, 0..command.len()))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((origin, Source::from(command)))
            .ok();
    }
}
