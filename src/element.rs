//! Element records and per-base-type parameter rewriting.

use indexmap::IndexMap;

use crate::diagnostic::Diagnostic;
use crate::expr::{bmad_expression, bmad_param, negate};
use crate::lexeme::{join_tokens, Lexeme};
use crate::tables;

pub type ElementTable = IndexMap<String, Element>;
pub type ParamMap = IndexMap<String, String>;

/// A defined beam-line element.
#[derive(Clone, Debug)]
pub struct Element {
    pub name: String,
    /// Immediate parent: another element name or a MADX base type.
    pub madx_inherit: String,
    pub madx_base_type: String,
    pub bmad_inherit: String,
    pub bmad_base_type: String,
    /// Position expression when placed in a sequence.
    pub at: String,
    /// Origin element name for `from = ...` placements.
    pub from_ref_ele: String,
    pub params: ParamMap,
    /// Duplicate-instance counter for modified reuse inside sequences.
    pub count: u32,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            madx_inherit: String::new(),
            madx_base_type: String::new(),
            bmad_inherit: String::new(),
            bmad_base_type: String::new(),
            at: "0".to_string(),
            from_ref_ele: String::new(),
            params: ParamMap::new(),
            count: 0,
        }
    }

    /// Length expression of this element, falling back to its immediate
    /// parent's definition.
    pub fn length_expr(&self, elements: &ElementTable) -> Option<String> {
        if let Some(l) = self.params.get("l") {
            return Some(l.clone());
        }
        elements
            .get(&self.madx_inherit)
            .and_then(|parent| parent.params.get("l").cloned())
    }
}

/// Parse a `name = value, name = value, ...` token run into an ordered map.
///
/// List braces and colons are discarded, `0.`/`0.0` normalize to `0`, and
/// bare logicals (`kill_ent_fringe`, `-thick`) become `true`/`false`
/// entries. A malformed list yields the entries parsed so far plus a
/// diagnostic.
pub fn parameter_dictionary(tokens: &[Lexeme]) -> (ParamMap, Option<Diagnostic>) {
    let mut filtered: Vec<Lexeme> = tokens
        .iter()
        .filter(|t| !matches!(t, Lexeme::LBrace | Lexeme::RBrace | Lexeme::Colon))
        .cloned()
        .collect();

    for tok in filtered.iter_mut() {
        if let Lexeme::Word(w) = tok {
            if w == "0.0" || w == "0." {
                *w = "0".to_string();
            }
        }
    }

    let mut pdict = ParamMap::new();

    // Bare logicals, possibly negated, with no "= value" following.
    for logical in tables::LOGICAL_PARAMS {
        let negated = format!("-{}", logical);
        for (name, value) in [(*logical, "true"), (negated.as_str(), "false")] {
            let Some(ix) = filtered.iter().position(|t| t.is_word(name)) else {
                continue;
            };
            if filtered.get(ix + 1) == Some(&Lexeme::Eq) {
                continue;
            }
            pdict.insert(logical.to_string(), value.to_string());
            filtered.remove(ix);
            // Take the list comma that separated the logical with it.
            if ix > 0 && filtered.get(ix - 1) == Some(&Lexeme::Comma) {
                filtered.remove(ix - 1);
            } else if filtered.get(ix) == Some(&Lexeme::Comma) {
                filtered.remove(ix);
            }
        }
    }

    let mut rest: &[Lexeme] = &filtered;
    loop {
        if rest.is_empty() {
            return (pdict, None);
        }

        if rest.len() < 2 || rest[1] != Lexeme::Eq {
            let problem = Diagnostic::error("problem parsing parameter list")
                .with_command(join_tokens(rest));
            return (pdict, Some(problem));
        }

        let name = rest[0].text().to_string();
        match rest[2..].iter().position(|t| *t == Lexeme::Eq) {
            Some(p) => {
                // The value runs up to the comma and name preceding the next
                // "=", which start the following pair.
                let ix = p + 2;
                pdict.insert(name, join_tokens(&rest[2..(ix - 2).max(2)]));
                rest = &rest[(ix - 1).max(2)..];
            }
            None => {
                pdict.insert(name, join_tokens(&rest[2..]));
                return (pdict, None);
            }
        }
    }
}

/// Fold a skew strength `kNs` into `kN` plus a tilt, for quadrupoles (n=1),
/// sextupoles (n=2), and octupoles (n=3).
fn combine_skew(params: &mut ParamMap, n: u32) {
    let k_name = format!("k{}", n);
    let ks_name = format!("k{}s", n);
    let divisor = n + 1;

    if params.contains_key(&k_name) && params.contains_key(&ks_name) {
        let k = params[&k_name].clone();
        let ks = params[&ks_name].clone();
        let tilt = match params.get("tilt") {
            Some(t) => format!("{} - atan2({}, {})/{}", t, ks, k, divisor),
            None => format!("-atan2({}, {})/{}", ks, k, divisor),
        };
        params.insert("tilt".to_string(), tilt);
        params.insert(k_name, format!("sqrt(({})^2 + ({})^2)", k, ks));
        params.shift_remove(&ks_name);
    } else if params.contains_key(&ks_name) {
        let frac = format!("pi/{}", 2 * divisor);
        let tilt = match params.get("tilt") {
            Some(t) => format!("{} - {}", t, frac),
            None => format!("-{}", frac),
        };
        params.insert("tilt".to_string(), tilt);
        params.shift_remove(&ks_name);
    }
}

/// Build an element from a definition of the form
/// `[name, ":", declared_type, ",", params...]`. The element is *not*
/// inserted into the table; the caller owns registration and emission.
pub fn build_element(
    tokens: &[Lexeme],
    elements: &ElementTable,
) -> (Option<Element>, Vec<Diagnostic>) {
    let mut diags = Vec::new();

    let name = match tokens.first().and_then(|t| t.word()) {
        Some(w) => w.to_string(),
        None => return (None, diags),
    };
    let declared = tokens.get(2).map(|t| t.text()).unwrap_or("");

    if declared == "dipedge" {
        diags.push(
            Diagnostic::error("dipedge elements cannot be translated")
                .with_help("modify the lattice and merge the dipedge into the neighboring bend"),
        );
        return (None, diags);
    }

    let mut ele = Element::new(&name);
    if let Some(parent) = elements.get(declared) {
        ele.madx_inherit = declared.to_string();
        ele.madx_base_type = parent.madx_base_type.clone();
        ele.bmad_inherit = declared.to_string();
        ele.bmad_base_type = parent.bmad_base_type.clone();
    } else if let Some((madx, bmad)) = tables::base_type(declared) {
        ele.madx_inherit = madx.to_string();
        ele.madx_base_type = madx.to_string();
        ele.bmad_inherit = bmad.to_string();
        ele.bmad_base_type = bmad.to_string();
    } else {
        diags.push(Diagnostic::error(format!(
            "unknown element type: {}",
            declared
        )));
        return (None, diags);
    }

    if ele.bmad_base_type == "???" {
        diags.push(Diagnostic::error(format!(
            "{} elements have no Bmad equivalent",
            ele.madx_base_type
        )));
        return (None, diags);
    }

    let param_tokens = if tokens.len() > 4 { &tokens[4..] } else { &[] };
    let (mut params, problem) = parameter_dictionary(param_tokens);
    if let Some(problem) = problem {
        diags.push(problem);
    }

    match ele.madx_base_type.as_str() {
        "elseparator" => {
            if let Some(ex) = params.get("ex").cloned() {
                match params.get("ey").cloned() {
                    Some(ey) => {
                        let tilt = match params.get("tilt") {
                            Some(t) => format!("{} - atan2({}, {})", t, ex, ey),
                            None => format!("-atan2({}, {})", ex, ey),
                        };
                        params.insert("tilt".to_string(), tilt);
                        params.insert(
                            "ey".to_string(),
                            format!("sqrt(({})^2 + ({})^2)", ex, ey),
                        );
                    }
                    None => {
                        let tilt = match params.get("tilt") {
                            Some(t) => format!("{} - pi/2", t),
                            None => "-pi/2".to_string(),
                        };
                        params.insert("tilt".to_string(), tilt);
                        params.insert("ey".to_string(), ex);
                    }
                }
                params.shift_remove("ex");
            }
        }

        "xrotation" => {
            if let Some(angle) = params.shift_remove("angle") {
                params.insert("y_pitch".to_string(), negate(&angle));
            }
        }

        "yrotation" => {
            if let Some(angle) = params.shift_remove("angle") {
                params.insert("x_pitch".to_string(), negate(&angle));
            }
        }

        "srotation" => {
            if let Some(angle) = params.shift_remove("angle") {
                params.insert("tilt".to_string(), angle);
            }
        }

        "changeref" => {
            if let Some(ang) = params.shift_remove("patch_ang") {
                let parts: Vec<&str> = ang.split(',').collect();
                if let Some(ax) = parts.first() {
                    params.insert("y_pitch".to_string(), ax.to_string());
                }
                if let Some(ay) = parts.get(1) {
                    params.insert("x_pitch".to_string(), negate(ay));
                }
                if let Some(az) = parts.get(2) {
                    params.insert("tilt".to_string(), az.to_string());
                }
            }
            if let Some(trans) = params.shift_remove("patch_trans") {
                let parts: Vec<&str> = trans.split(',').collect();
                for (key, part) in ["x_offset", "y_offset", "z_offset"].iter().zip(&parts) {
                    params.insert(key.to_string(), part.to_string());
                }
            }
        }

        "rbend" | "sbend" => {
            if let Some(tilt) = params.shift_remove("tilt") {
                params.insert("ref_tilt".to_string(), tilt);
            }
            let kill_ent = params.shift_remove("kill_ent_fringe").as_deref() == Some("true");
            let kill_exi = params.shift_remove("kill_exi_fringe").as_deref() == Some("true");
            if let Some(k0) = params.shift_remove("k0") {
                params.insert("g_err".to_string(), k0);
            }
            if params.contains_key("k0s") && params.contains_key("l") {
                let k0s = params.shift_remove("k0s").unwrap_or_default();
                let l = params["l"].clone();
                params.insert("a0".to_string(), format!("{} * {}", k0s, l));
            }
            let fringe = match (kill_ent, kill_exi) {
                (true, true) => Some("no_end"),
                (false, true) => Some("entrance_end"),
                (true, false) => Some("exit_end"),
                (false, false) => None,
            };
            if let Some(fringe) = fringe {
                params.insert("fringe_at".to_string(), fringe.to_string());
            }
        }

        "quadrupole" => combine_skew(&mut params, 1),
        "sextupole" => combine_skew(&mut params, 2),
        "octupole" => combine_skew(&mut params, 3),

        "multipole" => {
            if let Some(knl) = params.shift_remove("knl") {
                for (n, v) in knl.split(',').enumerate() {
                    if v == "0" {
                        continue;
                    }
                    params.insert(format!("k{}l", n), bmad_expression(v, "", elements));
                }
            }
            if let Some(ksl) = params.shift_remove("ksl") {
                for (n, v) in ksl.split(',').enumerate() {
                    if v == "0" {
                        continue;
                    }
                    params.insert(format!("k{}sl", n), bmad_expression(v, "", elements));
                }
            }
        }

        "collimator" => {
            let shape = match params.get("apertype").map(String::as_str) {
                Some("ellipse") | Some("circle") => "ecollimator",
                _ => "rcollimator",
            };
            ele.bmad_inherit = shape.to_string();
            ele.bmad_base_type = shape.to_string();
        }

        _ => {}
    }

    // Aperture handling applies to every element kind.
    if params.contains_key("apertype") {
        if let Some(aperture) = params.shift_remove("aperture") {
            let limits = bmad_expression(&aperture, "", elements);
            let mut parts = limits.split(',');
            if let Some(x) = parts.next() {
                params.insert("x_limit".to_string(), x.to_string());
            }
            if let Some(y) = parts.next() {
                params.insert("y_limit".to_string(), y.to_string());
            }
        }
        let shape = match params.get("apertype").map(String::as_str) {
            Some("ellipse") | Some("circle") => "elliptical",
            _ => "rectangular",
        };
        params.insert("aperture_type".to_string(), shape.to_string());
    }

    if let Some(offset) = params.shift_remove("aper_offset") {
        let parts: Vec<&str> = offset.split(',').collect();
        if let Some(x) = parts.first() {
            params.insert("x_offset".to_string(), x.to_string());
        }
        if let Some(y) = parts.get(1) {
            params.insert("y_offset".to_string(), y.to_string());
        }
    }

    if let Some(at) = params.shift_remove("at") {
        ele.at = at;
    }
    if let Some(from) = params.shift_remove("from") {
        ele.from_ref_ele = from;
    }

    ele.params = params;
    (Some(ele), diags)
}

/// Render the element's Bmad definition line.
pub fn definition_line(ele: &Element, elements: &ElementTable) -> String {
    let mut line = format!("{}: {}", ele.name, ele.bmad_inherit);
    for (param, value) in &ele.params {
        if tables::is_ignored_param(param) {
            continue;
        }
        line.push_str(&format!(
            ", {} = {}",
            bmad_param(param, &ele.name, elements),
            bmad_expression(value, param, elements)
        ));
    }
    line
}
