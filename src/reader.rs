//! Stack of open MADX input sources.
//!
//! `call` pushes a source, end-of-file or `return` pops one. The bottom
//! entry is the root lattice file; once it pops, translation is over.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};

pub struct Source {
    pub name: String,
    reader: Box<dyn BufRead>,
}

#[derive(Default)]
pub struct InputStack {
    stack: Vec<Source>,
}

impl InputStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_file(&mut self, path: &str) -> io::Result<()> {
        let file = File::open(path)?;
        self.stack.push(Source {
            name: path.to_string(),
            reader: Box::new(BufReader::new(file)),
        });
        Ok(())
    }

    /// Push an in-memory source (tests, benches).
    pub fn push_string(&mut self, name: impl Into<String>, contents: &str) {
        self.stack.push(Source {
            name: name.into(),
            reader: Box::new(Cursor::new(contents.as_bytes().to_vec())),
        });
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn current_name(&self) -> Option<&str> {
        self.stack.last().map(|s| s.name.as_str())
    }

    /// Next raw line of the top source, without its line terminator.
    /// `None` means the top source is exhausted; the caller decides whether
    /// to pop and continue or to stop.
    pub fn read_line(&mut self) -> Option<String> {
        let source = self.stack.last_mut()?;
        let mut buf = String::new();
        match source.reader.read_line(&mut buf) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                while buf.ends_with('\n') || buf.ends_with('\r') {
                    buf.pop();
                }
                Some(buf)
            }
        }
    }
}
