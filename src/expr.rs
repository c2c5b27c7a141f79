//! MADX → Bmad scalar-expression rewriting.
//!
//! Token-substitutive rather than AST-based: the expression is split on
//! operator characters with separators kept, then rewritten left to right.
//! Element-attribute dereferences (`elem->param`) become `elem[param]`,
//! constants are renamed, and unit factors are appended where MADX and Bmad
//! disagree on units.

use crate::element::ElementTable;
use crate::tables;

/// Convert a MADX parameter name to its Bmad name. `ele_name` supplies the
/// context needed for type-dependent renames (`tilt` on a bend is `ref_tilt`).
pub fn bmad_param(param: &str, ele_name: &str, elements: &ElementTable) -> String {
    let madx_type = elements
        .get(ele_name)
        .map(|e| e.madx_base_type.as_str())
        .unwrap_or("");

    let b = param.as_bytes();
    let digit16 = |c: u8| (b'1'..=b'6').contains(&c);

    if param == "tilt" {
        if madx_type == "sbend" || madx_type == "rbend" {
            return "ref_tilt".to_string();
        }
        return "tilt".to_string();
    }

    // kickN → ttN
    if b.len() == 5 && param.starts_with("kick") && digit16(b[4]) {
        return format!("tt{}", &param[4..]);
    }

    // rmNM → ttNM
    if b.len() == 4 && param.starts_with("rm") && digit16(b[2]) && digit16(b[3]) {
        return format!("tt{}", &param[2..]);
    }

    // tmNMP → ttNMP
    if b.len() == 5 && param.starts_with("tm") && digit16(b[2]) && digit16(b[3]) && digit16(b[4]) {
        return format!("tt{}", &param[2..]);
    }

    // A skew strength "kNs" renames to "kN"; the per-type rewrites fold the
    // skew into a tilt so this is only reached for bare parameter sets.
    if b.len() == 3 && b[0] == b'k' && b[1].is_ascii_digit() && b[2] == b's' {
        return param[..2].to_string();
    }

    if let Some(renamed) = tables::param_rename(param) {
        return renamed.to_string();
    }

    param.to_string()
}

/// Split an expression on `, - + ( ) > * / ^`, keeping each separator as its
/// own piece. Whitespace stays attached to the adjoining pieces.
fn split_expr(expr: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    for ch in expr.chars() {
        if matches!(ch, ',' | '-' | '+' | '(' | ')' | '>' | '*' | '/' | '^') {
            if !cur.is_empty() {
                parts.push(std::mem::take(&mut cur));
            }
            parts.push(ch.to_string());
        } else {
            cur.push(ch);
        }
    }
    if !cur.is_empty() {
        parts.push(cur);
    }
    parts
}

/// Convert a MADX expression to Bmad syntax. When `target_param` names a MADX
/// parameter with a unit mismatch, the whole expression is rescaled by the
/// inverse factor (for constructs of the form `target_param = <expression>`).
pub fn bmad_expression(expr: &str, target_param: &str, elements: &ElementTable) -> String {
    // List braces ("knl := {a, b, c}") carry no meaning here.
    let cleaned: String = expr.chars().filter(|c| *c != '{' && *c != '}').collect();
    let lst = split_expr(&cleaned);

    let mut out = String::new();
    let mut i = 0;
    while i < lst.len() {
        // <name> - > <attr>  is an element-attribute dereference.
        if lst.len() - i >= 4 && lst[i + 1] == "-" && lst[i + 2] == ">" {
            let name = &lst[i];
            let attr = lst[i + 3].trim();
            let bracketed = format!("{}[{}]", name, bmad_param(attr, name.trim(), elements));
            match tables::unit_factor(attr) {
                Some(factor) => {
                    // As the base of `^` or the denominator of `/` the scaled
                    // form needs its own parentheses.
                    let before_pow = lst.len() - i >= 5 && lst[i + 4] == "^";
                    let after_div = out.trim_end().ends_with('/');
                    if before_pow || after_div {
                        out.push('(');
                        out.push_str(&bracketed);
                        out.push_str(factor);
                        out.push(')');
                    } else {
                        out.push_str(&bracketed);
                        out.push_str(factor);
                    }
                }
                None => out.push_str(&bracketed),
            }
            i += 4;
        } else if let Some(translated) = tables::constant(lst[i].trim()) {
            out.push_str(translated);
            i += 1;
        } else {
            out.push_str(&lst[i]);
            i += 1;
        }
    }

    if let Some(inv) = tables::inv_unit_factor(target_param) {
        out = format!("{}{}", add_parens(&out, true), inv);
    }
    out
}

/// Wrap `expr` in parentheses iff it contains a top-level `+` or `-`, so the
/// result can be safely embedded in a product or quotient. Signs inside a
/// scientific-notation exponent (`3e-4`) do not count; a leading sign is
/// exempt when `ignore_leading_pm` is set.
pub fn add_parens(expr: &str, ignore_leading_pm: bool) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Begin,
        Out,
        Mantissa,
        ExpMarker,
        Exponent,
    }
    let mut state = State::Begin;

    for ch in expr.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            match state {
                State::Begin | State::Out => state = State::Mantissa,
                State::ExpMarker => state = State::Exponent,
                _ => {}
            }
        } else if ch == 'e' {
            state = if state == State::Mantissa {
                State::ExpMarker
            } else {
                State::Out
            };
        } else if ch == '-' || ch == '+' {
            if state == State::ExpMarker {
                state = State::Exponent;
            } else if state == State::Begin && ignore_leading_pm {
                state = State::Out;
            } else {
                return format!("({})", expr);
            }
        } else {
            state = State::Out;
        }
    }

    expr.to_string()
}

/// Negate an expression textually, folding a leading sign when possible.
pub fn negate(expr: &str) -> String {
    let expr = add_parens(expr, true);
    if let Some(rest) = expr.strip_prefix('-') {
        rest.to_string()
    } else if let Some(rest) = expr.strip_prefix('+') {
        format!("-{}", rest)
    } else {
        format!("-{}", expr)
    }
}
