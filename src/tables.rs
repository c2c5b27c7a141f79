//! Fixed translation tables: MADX base types, parameter renames, unit
//! factors, and constant names.

/// MADX base type → Bmad base type, in match order. A declared type matches
/// the first table entry it is a prefix of (MADX allows abbreviated type
/// names). `???` marks types with no Bmad counterpart.
pub const BASE_TYPES: &[(&str, &str)] = &[
    ("tkicker", "kicker"),
    ("hacdipole", "ac_kicker"),
    ("placeholder", "instrument"),
    ("matrix", "taylor"),
    ("srotation", "patch"),
    ("xrotation", "patch"),
    ("yrotation", "patch"),
    ("translation", "patch"),
    ("changeref", "patch"),
    ("monitor", "monitor"),
    ("hmonitor", "monitor"),
    ("vmonitor", "monitor"),
    ("marker", "marker"),
    ("drift", "drift"),
    ("sbend", "sbend"),
    ("rbend", "rbend"),
    ("quadrupole", "quadrupole"),
    ("sextupole", "sextupole"),
    ("octupole", "octupole"),
    ("multipole", "multipole"),
    ("solenoid", "solenoid"),
    ("hkicker", "hkicker"),
    ("vkicker", "vkicker"),
    ("kicker", "kicker"),
    ("rfcavity", "rfcavity"),
    ("twcavity", "lcavity"),
    ("elseparator", "elseparator"),
    ("instrument", "instrument"),
    ("ecollimator", "ecollimator"),
    ("rcollimator", "rcollimator"),
    ("collimator", "collimator"), // resolved to e/rcollimator by apertype
    ("beambeam", "beambeam"),
    ("crabcavity", "crab_cavity"),
    ("vacdipole", "ac_kicker"),
    ("rfmultipole", "???"),
    ("nllens", "???"),
    ("dipedge", "???"),
    ("sequence", "???"),
    ("twiss", "???"),
    ("beam", "???"),
];

/// Look up a declared MADX type, allowing prefix abbreviation.
pub fn base_type(declared: &str) -> Option<(&'static str, &'static str)> {
    BASE_TYPES
        .iter()
        .find(|(madx, _)| madx.starts_with(declared))
        .copied()
}

/// Unit conversion appended when a MADX parameter is *read* in an expression
/// (`elem->volt` is in MV, Bmad voltage is in V).
pub fn unit_factor(param: &str) -> Option<&'static str> {
    match param {
        "volt" => Some(" * 1e-6"),
        "freq" => Some(" * 1e-6"),
        "energy" => Some(" * 1e-9"),
        "ex" => Some(" * 1e-6"),
        "ey" => Some(" * 1e-6"),
        "pc" => Some(" * 1e-9"),
        "lag" => Some(" + 0.5"),
        _ => None,
    }
}

/// Inverse conversion appended when an expression is *assigned to* a MADX
/// parameter.
pub fn inv_unit_factor(param: &str) -> Option<&'static str> {
    match param {
        "volt" => Some(" * 1e6"),
        "freq" => Some(" * 1e6"),
        "energy" => Some(" * 1e9"),
        "ex" => Some(" * 1e6"),
        "ey" => Some(" * 1e6"),
        "pc" => Some(" * 1e9"),
        "lag" => Some(" + 0.5"),
        _ => None,
    }
}

/// MADX constant / intrinsic-function names with a different Bmad spelling.
pub fn constant(name: &str) -> Option<&'static str> {
    match name {
        "e" => Some("e_log"),
        "nmass" => Some("m_neutron * 1e9"),
        "mumass" => Some("m_muon * 1e9"),
        "clight" => Some("c_light"),
        "qelect" => Some("e_charge"),
        "hbar" => Some("h_bar * 1e6"),
        "erad" => Some("r_e"),
        "prad" => Some("r_p"),
        "ceil" => Some("ceiling"),
        "round" => Some("nint"),
        "ranf" => Some("ran"),
        "gauss" => Some("ran_gauss"),
        _ => None,
    }
}

/// MADX parameters with no Bmad counterpart; dropped at emission.
pub fn is_ignored_param(param: &str) -> bool {
    matches!(
        param,
        "lrad"
            | "slot_id"
            | "aper_tol"
            | "apertype"
            | "thick"
            | "add_angle"
            | "assembly_id"
            | "mech_sep"
            | "betrf"
            | "tfill"
            | "shunt"
            | "pg"
    )
}

/// Straight parameter-name renames. Structural renames (tilt on a bend,
/// kickN/rmNM/tmNMP, skew strengths) live in `expr::bmad_param`.
pub fn param_rename(param: &str) -> Option<&'static str> {
    match param {
        "volt" => Some("voltage"),
        "freq" => Some("rf_frequency"),
        "lag" => Some("phi0"),
        "ex" => Some("e_field"),
        "ey" => Some("e_field"),
        "lrad" => Some("l"),
        "xsize" => Some("x_limit"),
        "ysize" => Some("y_limit"),
        "dx" => Some("x_offset"),
        "dy" => Some("y_offset"),
        "ds" => Some("z_offset"),
        _ => None,
    }
}

/// Bare logical parameter names ("kill_ent_fringe" / "-kill_ent_fringe").
pub const LOGICAL_PARAMS: &[&str] = &[
    "kill_ent_fringe",
    "kill_exi_fringe",
    "thick",
    "no_cavity_totalpath",
];
