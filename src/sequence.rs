//! Sequence parsing and flattening.
//!
//! A `sequence ... endsequence` block places elements by offset inside a
//! reference frame. In line mode the sequence becomes a Bmad `line` with
//! synthesized drifts filling the gaps; in superimpose mode each member
//! becomes a `superimpose` directive against a null_ele marker.

use indexmap::IndexMap;

use crate::diagnostic::Diagnostic;
use crate::dispatch::Translator;
use crate::element::{parameter_dictionary, Element};
use crate::expr::{add_parens, bmad_expression};
use crate::lexeme::Lexeme;
use crate::scan::Statement;

/// Reference frame for member offsets within a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refer {
    Entry,
    Centre,
    Exit,
}

impl Refer {
    pub fn parse(s: &str) -> Self {
        match s {
            "entry" => Refer::Entry,
            "exit" => Refer::Exit,
            _ => Refer::Centre,
        }
    }

    /// The matching Bmad `ele_origin` keyword.
    pub fn bmad_origin(self) -> &'static str {
        match self {
            Refer::Entry => "beginning",
            Refer::Centre => "center",
            Refer::Exit => "end",
        }
    }
}

/// A sequence being assembled or already sealed.
#[derive(Clone, Debug)]
pub struct Sequence {
    pub name: String,
    /// Declared total length expression.
    pub l: String,
    pub refer: Refer,
    /// Optional member used as the origin for nested placement.
    pub refpos: String,
    /// Elements defined inside this sequence.
    pub members: IndexMap<String, Element>,
    pub drift_count: u32,
    /// Right edge of the last placed member, as an expression.
    pub last_ele_offset: String,
    /// Accumulated comma-joined member list for the emitted line.
    pub line: String,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            l: "0".to_string(),
            refer: Refer::Centre,
            refpos: String::new(),
            members: IndexMap::new(),
            drift_count: 0,
            last_ele_offset: String::new(),
            line: String::new(),
        }
    }

    fn next_drift(&mut self) -> String {
        let name = format!("drft{}_{}", self.drift_count, self.name);
        self.drift_count += 1;
        name
    }
}

impl Translator {
    /// `name: sequence, l = ..., refer = ..., refpos = ...`
    pub(crate) fn start_sequence(&mut self, st: &Statement) {
        let name = st.tokens[0].text().to_string();
        let mut seq = Sequence::new(&name);

        if st.tokens.len() > 4 {
            let (params, problem) = parameter_dictionary(&st.tokens[4..]);
            if let Some(problem) = problem {
                self.diag_cmd(problem, &st.text);
            }
            if let Some(l) = params.get("l") {
                seq.l = l.clone();
            }
            if let Some(refer) = params.get("refer") {
                seq.refer = Refer::parse(refer);
            }
            if let Some(refpos) = params.get("refpos") {
                seq.refpos = refpos.clone();
            }
            for unsupported in ["add_pass", "next_sequ"] {
                if params.contains_key(unsupported) {
                    self.diag_cmd(
                        Diagnostic::warning(format!(
                            "cannot handle \"{}\" in a sequence",
                            unsupported
                        )),
                        &st.text,
                    );
                }
            }
        }

        if self.opts.superimpose {
            let out = self.out.top();
            out.write_line(&format!("{}_mark: null_ele", name));
            out.write_line(&format!("{}_drift: drift, l = {}", name, seq.l));
            out.write_line(&format!("{}: line = ({}_mark, {}_drift)", name, name, name));
        }

        self.cur_seq = Some(seq);
    }

    /// One command encountered while inside `sequence ... endsequence`.
    pub(crate) fn sequence_member(&mut self, st: &Statement) {
        let Some(mut seq) = self.cur_seq.take() else {
            return;
        };

        let toks = &st.tokens;
        let mut placed: Option<(Element, String)> = None;
        let mut is_ele = true;

        if toks.len() >= 3 && toks[1] == Lexeme::Colon && toks[0] == toks[2] {
            // "name: name, at = ..." — reuses the element verbatim.
            if let Some(ele) = self.parse_and_register(toks, false, &st.text) {
                let name = ele.name.clone();
                placed = Some((ele, name));
            }
        } else if toks[0]
            .word()
            .is_some_and(|w| self.elements.contains_key(w))
        {
            // "name, at = ..." — a known element, possibly with overrides.
            let base = toks[0].text().to_string();
            let mut retyped = vec![toks[0].clone(), Lexeme::Colon];
            retyped.extend_from_slice(toks);
            if let Some(ele) = self.parse_and_register(&retyped, false, &st.text) {
                if ele.params.is_empty() {
                    let name = ele.name.clone();
                    placed = Some((ele, name));
                } else {
                    // Overridden parameters need a fresh uniquely-named clone.
                    let count = {
                        let entry = &mut self.elements[&base];
                        entry.count += 1;
                        entry.count
                    };
                    let clone_name = format!("{}__{}", base, count);
                    let mut renamed = vec![Lexeme::Word(clone_name.clone()), Lexeme::Colon];
                    renamed.extend_from_slice(toks);
                    if let Some(ele) = self.parse_and_register(&renamed, true, &st.text) {
                        placed = Some((ele, clone_name));
                    }
                }
            }
        } else if toks.len() >= 2 && toks[1] == Lexeme::Colon {
            // "name: type, ..." — an element defined inside the sequence.
            if let Some(ele) = self.parse_and_register(toks, true, &st.text) {
                seq.members.insert(ele.name.clone(), ele.clone());
                let name = ele.name.clone();
                placed = Some((ele, name));
            }
        } else {
            is_ele = false;
        }

        if is_ele {
            if let Some((ele, ele_name)) = placed {
                self.place_member(&mut seq, &ele, &ele_name, st);
            }
            self.cur_seq = Some(seq);
            return;
        }

        self.place_subsequence(&mut seq, st);
        self.cur_seq = Some(seq);
    }

    /// Place a single element member: synthesize the leading drift (line
    /// mode) or emit a superimpose directive.
    fn place_member(&mut self, seq: &mut Sequence, ele: &Element, ele_name: &str, st: &Statement) {
        let mut offset = bmad_expression(&ele.at, "", &self.elements);

        if !ele.from_ref_ele.is_empty() {
            match seq.members.get(&ele.from_ref_ele) {
                Some(from_ele) => {
                    let from_at =
                        add_parens(&bmad_expression(&from_ele.at, "", &self.elements), false);
                    offset.push_str(&format!(" + {}", from_at));
                    if let Some(l) = from_ele.params.get("l") {
                        let half = add_parens(&bmad_expression(l, "", &self.elements), false);
                        match seq.refer {
                            Refer::Entry => offset.push_str(&format!(" + {} / 2", half)),
                            Refer::Exit => offset.push_str(&format!(" - {} / 2", half)),
                            Refer::Centre => {}
                        }
                    }
                }
                None => self.diag_cmd(
                    Diagnostic::warning(format!(
                        "\"from\" reference {} is not defined in sequence {}",
                        ele.from_ref_ele, seq.name
                    )),
                    &st.text,
                ),
            }
        }

        if self.opts.superimpose {
            self.out.top().write_line(&format!(
                "superimpose, element = {}, ref = {}_mark, offset = {}, ele_origin = {}",
                ele_name,
                seq.name,
                offset,
                seq.refer.bmad_origin()
            ));
            return;
        }

        let mut last_offset = offset.clone();
        let drift_name = seq.next_drift();
        let mut drift_line = format!("{}: drift, l = {}", drift_name, offset);

        let length = ele
            .length_expr(&self.elements)
            .map(|l| add_parens(&bmad_expression(&l, "", &self.elements), false));

        if let Some(length) = length {
            match seq.refer {
                Refer::Entry => last_offset.push_str(&format!(" + {}", length)),
                Refer::Centre => {
                    drift_line.push_str(&format!(" - {}/2", length));
                    last_offset.push_str(&format!(" + {}/2", length));
                }
                Refer::Exit => drift_line.push_str(&format!(" - {}", length)),
            }
        }

        if !seq.last_ele_offset.is_empty() {
            drift_line.push_str(&format!(" - {}", add_parens(&seq.last_ele_offset, false)));
        }

        self.out.top().write_line(&drift_line);
        seq.line.push_str(&format!("{}, {}, ", drift_name, ele_name));
        seq.last_ele_offset = last_offset;
    }

    /// Place a nested sequence reference: "name, at = ..., from = ...".
    fn place_subsequence(&mut self, seq: &mut Sequence, st: &Statement) {
        let toks = &st.tokens;
        let name = toks[0].text().to_string();

        let Some(inner) = self.sequences.get(&name).cloned() else {
            self.diag_cmd(
                Diagnostic::error(format!(
                    "cannot identify this as an element or sequence: {}",
                    name
                )),
                &st.text,
            );
            return;
        };

        let (params, problem) = parameter_dictionary(if toks.len() > 2 { &toks[2..] } else { &[] });
        if let Some(problem) = problem {
            self.diag_cmd(problem, &st.text);
        }
        let at = params.get("at").cloned().unwrap_or_else(|| "0".to_string());
        let from_ref = params.get("from").cloned().unwrap_or_default();

        let mut offset = bmad_expression(&at, "", &self.elements);
        if !from_ref.is_empty() {
            match seq.members.get(&from_ref) {
                Some(from_ele) => {
                    let from_at =
                        add_parens(&bmad_expression(&from_ele.at, "", &self.elements), false);
                    offset = format!("{} - {}", offset, from_at);
                }
                None => self.diag_cmd(
                    Diagnostic::warning(format!(
                        "\"from\" reference {} is not defined in sequence {}",
                        from_ref, seq.name
                    )),
                    &st.text,
                ),
            }
        }

        let mut last_offset = offset.clone();
        let length = add_parens(&bmad_expression(&inner.l, "", &self.elements), false);

        let drift_name = seq.next_drift();
        let mut drift_line = format!("{}: drift, l = {}", drift_name, offset);

        if !inner.refpos.is_empty() {
            match inner.members.get(&inner.refpos) {
                Some(refpos_ele) => {
                    offset.push_str(&format!(" - {}", add_parens(&refpos_ele.at, false)));
                    last_offset.push_str(&format!(
                        " + {} - {}",
                        refpos_ele.at,
                        add_parens(&inner.l, false)
                    ));
                }
                None => self.diag_cmd(
                    Diagnostic::warning(format!(
                        "refpos element {} is not defined in sequence {}",
                        inner.refpos, inner.name
                    )),
                    &st.text,
                ),
            }
        } else {
            match seq.refer {
                Refer::Entry => {
                    if !length.is_empty() {
                        last_offset.push_str(&format!(" + {}", length));
                    }
                }
                Refer::Centre => {
                    offset.push_str(&format!(" - {}/2", add_parens(&length, false)));
                    if !length.is_empty() {
                        drift_line.push_str(&format!(" - {}/2", length));
                        last_offset.push_str(&format!(" + {}/2", length));
                    }
                }
                Refer::Exit => {
                    offset.push_str(&format!(" - {}", add_parens(&length, false)));
                    if !length.is_empty() {
                        drift_line.push_str(&format!(" - {}", length));
                    }
                }
            }
        }

        if self.opts.superimpose {
            let directive = format!(
                "superimpose, element = {}_mark, ref = {}_mark, offset = {}",
                name, seq.name, offset
            );
            self.out.top().write_line(&format!("!!** {}", directive));
            self.super_list.push(directive);
            return;
        }

        if !seq.last_ele_offset.is_empty() {
            drift_line.push_str(&format!(" - {}", add_parens(&seq.last_ele_offset, false)));
        }
        self.out.top().write_line(&drift_line);
        seq.line.push_str(&format!("{}, {}, ", drift_name, name));
        seq.last_ele_offset = last_offset;
    }

    /// `endsequence`: seal the sequence; in line mode, close the gap to the
    /// declared total length and emit the line definition.
    pub(crate) fn end_sequence(&mut self) {
        let Some(mut seq) = self.cur_seq.take() else {
            return;
        };

        if !self.opts.superimpose {
            let offset = if seq.last_ele_offset.is_empty() {
                seq.l.clone()
            } else {
                format!("{} - {}", seq.l, add_parens(&seq.last_ele_offset, false))
            };
            let drift_name = seq.next_drift();
            self.out
                .top()
                .write_line(&format!("{}: drift, l = {}", drift_name, offset));
            self.out
                .top()
                .wrap_write(&format!("{}: line = ({}{})", seq.name, seq.line, drift_name));
        }

        self.sequences.insert(seq.name.clone(), seq);
    }
}
