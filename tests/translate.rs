//! End-to-end translation tests: MADX source in, Bmad text out.

use madx2bmad::{translate_string, Options, Translator};

fn translate(source: &str) -> String {
    translate_string(source, Options::default())
}

fn translate_with(source: &str, opts: Options) -> String {
    translate_string(source, opts)
}

fn has_line(output: &str, line: &str) -> bool {
    output.lines().any(|l| l == line)
}

// ── Element definitions ──

#[test]
fn test_plain_quadrupole_roundtrip() {
    let out = translate("q1: quadrupole, l = 0.5, k1 = 0.3;\n");
    assert!(has_line(&out, "q1: quadrupole, l = 0.5, k1 = 0.3"), "{}", out);
}

#[test]
fn test_quadrupole_skew_decomposition() {
    let out = translate("q2: quadrupole, k1 = 0.2, k1s = 0.2;\n");
    assert!(
        has_line(
            &out,
            "q2: quadrupole, k1 = sqrt((0.2)^2 + (0.2)^2), tilt = -atan2(0.2, 0.2)/2"
        ),
        "{}",
        out
    );
    assert!(!out.contains("k1s"));
}

#[test]
fn test_bend_rewrites() {
    let out = translate("b1: sbend, l = 1, tilt = 0.1, k0 = 0.01, kill_ent_fringe;\n");
    assert!(
        has_line(
            &out,
            "b1: sbend, l = 1, ref_tilt = 0.1, g_err = 0.01, fringe_at = exit_end"
        ),
        "{}",
        out
    );
}

#[test]
fn test_bend_tilt_becomes_ref_tilt_only() {
    let out = translate("b: sbend, l = 1, tilt = t;\n");
    assert!(out.contains("ref_tilt = t"));
    assert!(!out.contains(", tilt ="));
}

#[test]
fn test_multipole_expansion_skips_zeros() {
    let out = translate("m1: multipole, knl = {0, 0.1, 0, 0.02};\n");
    assert!(has_line(&out, "m1: multipole, k1l = 0.1, k3l = 0.02"), "{}", out);
}

#[test]
fn test_elseparator_field_composition() {
    let out = translate("e: elseparator, ex = 1e5, ey = 2e5;\n");
    assert!(
        has_line(
            &out,
            "e: elseparator, e_field = (sqrt((1e5)^2 + (2e5)^2)) * 1e6, tilt = -atan2(1e5, 2e5)"
        ),
        "{}",
        out
    );
}

#[test]
fn test_element_inheritance() {
    let out = translate("qf: quadrupole, l = 0.5;\nqff: qf, k1 = 0.1;\n");
    assert!(has_line(&out, "qf: quadrupole, l = 0.5"));
    assert!(has_line(&out, "qff: qf, k1 = 0.1"));
}

#[test]
fn test_untranslatable_elements_are_dropped() {
    let out = translate("d1: dipedge, e1 = 0.1;\nn1: nllens, knll = 1;\n");
    assert!(!out.contains("dipedge"));
    assert!(!out.contains("nllens"));
}

#[test]
fn test_abbreviated_type_names() {
    let out = translate("q1: quad, l = 0.5;\n");
    assert!(has_line(&out, "q1: quadrupole, l = 0.5"), "{}", out);
}

// ── Sequences ──

#[test]
fn test_sequence_flattens_to_line_with_drifts() {
    let out = translate(
        "q1: quadrupole, l = 0.5;\n\
         q2: quadrupole, l = 0.5;\n\
         seq: sequence, l = 4, refer = centre;\n\
         q1, at = 1;\n\
         q2, at = 3;\n\
         endsequence;\n",
    );
    assert!(has_line(&out, "drft0_seq: drift, l = 1 - 0.5/2"), "{}", out);
    assert!(
        has_line(&out, "drft1_seq: drift, l = 3 - 0.5/2 - (1 + 0.5/2)"),
        "{}",
        out
    );
    assert!(has_line(&out, "drft2_seq: drift, l = 4 - (3 + 0.5/2)"), "{}", out);
    assert!(
        has_line(&out, "seq: line = (drft0_seq, q1, drft1_seq, q2, drft2_seq)"),
        "{}",
        out
    );
}

#[test]
fn test_empty_sequence_is_one_drift() {
    let out = translate("s2: sequence, l = 5;\nendsequence;\n");
    assert!(has_line(&out, "drft0_s2: drift, l = 5"), "{}", out);
    assert!(has_line(&out, "s2: line = (drft0_s2)"), "{}", out);
}

#[test]
fn test_refer_entry_and_exit() {
    let out = translate(
        "q1: quadrupole, l = 0.5;\n\
         s: sequence, l = 4, refer = entry;\n\
         q1, at = 1;\n\
         endsequence;\n",
    );
    assert!(has_line(&out, "drft0_s: drift, l = 1"), "{}", out);
    assert!(has_line(&out, "drft1_s: drift, l = 4 - (1 + 0.5)"), "{}", out);

    let out = translate(
        "q1: quadrupole, l = 0.5;\n\
         s: sequence, l = 4, refer = exit;\n\
         q1, at = 1;\n\
         endsequence;\n",
    );
    assert!(has_line(&out, "drft0_s: drift, l = 1 - 0.5"), "{}", out);
    assert!(has_line(&out, "drft1_s: drift, l = 4 - 1"), "{}", out);
}

#[test]
fn test_sequence_local_definition() {
    let out = translate(
        "s: sequence, l = 2;\n\
         m1: marker, at = 1;\n\
         endsequence;\n",
    );
    assert!(has_line(&out, "m1: marker"), "{}", out);
    assert!(has_line(&out, "drft0_s: drift, l = 1"), "{}", out);
    assert!(has_line(&out, "s: line = (drft0_s, m1, drft1_s)"), "{}", out);
}

#[test]
fn test_sequence_member_with_overrides_clones() {
    let out = translate(
        "q1: quadrupole, l = 0.5;\n\
         s: sequence, l = 4;\n\
         q1, at = 1, k1 = 0.3;\n\
         endsequence;\n",
    );
    assert!(has_line(&out, "q1__1: q1, k1 = 0.3"), "{}", out);
    assert!(out.contains("drft0_s, q1__1"), "{}", out);
}

#[test]
fn test_sequence_member_from_reference() {
    let out = translate(
        "s: sequence, l = 10, refer = entry;\n\
         m1: marker, at = 2;\n\
         m2: marker, at = 3, from = m1;\n\
         endsequence;\n",
    );
    // m2 sits at 3 past m1's own offset.
    assert!(has_line(&out, "drft1_s: drift, l = 3 + 2 - 2"), "{}", out);
}

#[test]
fn test_nested_sequence_placement() {
    let out = translate(
        "inner: sequence, l = 2;\n\
         endsequence;\n\
         outer: sequence, l = 10, refer = entry;\n\
         inner, at = 4;\n\
         endsequence;\n",
    );
    assert!(has_line(&out, "drft0_outer: drift, l = 4"), "{}", out);
    assert!(has_line(&out, "outer: line = (drft0_outer, inner, drft1_outer)"), "{}", out);
    assert!(has_line(&out, "drft1_outer: drift, l = 10 - (4 + 2)"), "{}", out);
}

#[test]
fn test_superimpose_mode() {
    let opts = Options {
        superimpose: true,
        ..Options::default()
    };
    let out = translate_with(
        "q1: quadrupole, l = 0.5;\n\
         seq: sequence, l = 4, refer = centre;\n\
         q1, at = 1;\n\
         endsequence;\n",
        opts,
    );
    assert!(has_line(&out, "seq_mark: null_ele"), "{}", out);
    assert!(has_line(&out, "seq_drift: drift, l = 4"), "{}", out);
    assert!(has_line(&out, "seq: line = (seq_mark, seq_drift)"), "{}", out);
    assert!(
        has_line(
            &out,
            "superimpose, element = q1, ref = seq_mark, offset = 1, ele_origin = center"
        ),
        "{}",
        out
    );
    assert!(!out.contains("drft0_seq"));
}

// ── Variables and parameter sets ──

#[test]
fn test_variables_are_hoisted() {
    let out = translate("q1: quadrupole, k1 = qk;\nqk = 0.3;\n");
    let var_ix = out.find("qk = 0.3").expect("variable emitted");
    let ele_ix = out.find("q1: quadrupole").expect("element emitted");
    assert!(var_ix < ele_ix, "{}", out);
}

#[test]
fn test_no_prepend_vars_flag() {
    let opts = Options {
        prepend_vars: false,
        ..Options::default()
    };
    let out = translate_with("q1: quadrupole, k1 = qk;\nqk = 0.3;\n", opts);
    let ele_ix = out.find("q1: quadrupole").expect("element emitted");
    let var_ix = out.find("qk = 0.3").expect("variable emitted in place");
    assert!(ele_ix < var_ix, "{}", out);
}

#[test]
fn test_variable_with_element_reference_not_hoisted() {
    let out = translate("q1: quadrupole, k1 = 0.3;\nqk2 = 2 * q1->k1;\n");
    let ele_ix = out.find("q1: quadrupole").expect("element emitted");
    let var_ix = out.find("qk2 = 2 * q1[k1]").expect("variable emitted in place");
    assert!(ele_ix < var_ix, "{}", out);
}

#[test]
fn test_colon_eq_assignment() {
    let out = translate("qk := 0.25;\n");
    assert!(has_line(&out, "qk = 0.25"), "{}", out);
}

#[test]
fn test_attribute_assignment() {
    let out = translate("q1: quadrupole, l = 0.5;\nq1->k1 = 0.7;\n");
    assert!(has_line(&out, "q1[k1] = 0.7"), "{}", out);
}

#[test]
fn test_comma_form_parameter_set() {
    let out = translate("q1: quadrupole, l = 0.5;\nq1, k1 = 0.7;\n");
    assert!(has_line(&out, "q1[k1] = 0.7"), "{}", out);
}

#[test]
fn test_unit_factor_on_attribute_assignment() {
    let out = translate("c1: rfcavity, l = 1;\nc1->volt = 5;\n");
    assert!(has_line(&out, "c1[voltage] = 5 * 1e6"), "{}", out);
}

// ── Top-level commands ──

#[test]
fn test_beam_command() {
    let out = translate("beam, particle = electron, energy = 120, npart = 1e10;\n");
    assert!(has_line(&out, "parameter[particle] = electron"), "{}", out);
    assert!(has_line(&out, "parameter[E_tot] = 120 * 1e9"), "{}", out);
    assert!(has_line(&out, "parameter[n_part] = 1e10"), "{}", out);
}

#[test]
fn test_beam_gamma() {
    let out = translate("beam, particle = proton, gamma = 7000;\n");
    assert!(
        has_line(&out, "parameter[E_tot] = mass_of(parameter[particle]) * 7000"),
        "{}",
        out
    );
}

#[test]
fn test_twiss_command() {
    let out = translate("twiss, betx = 1.2, alfy = 0.5, mux = 0.25, x = 1e-3;\n");
    assert!(has_line(&out, "beginning[beta_a] = 1.2"), "{}", out);
    assert!(has_line(&out, "beginning[alpha_b] = 0.5"), "{}", out);
    assert!(has_line(&out, "beginning[phi_a] = twopi * 0.25"), "{}", out);
    assert!(has_line(&out, "particle_start[x] = 1e-3"), "{}", out);
}

#[test]
fn test_beta0_form() {
    let out = translate("init: beta0, betx = 9, bety = 4;\n");
    assert!(has_line(&out, "beginning[beta_a] = 9"), "{}", out);
    assert!(has_line(&out, "beginning[beta_b] = 4"), "{}", out);
}

#[test]
fn test_use_command() {
    let out = translate("use, period = ring;\n");
    assert!(has_line(&out, "use, ring"), "{}", out);
    let out = translate("use, ring;\n");
    assert!(has_line(&out, "use, ring"), "{}", out);
}

#[test]
fn test_title_with_and_without_comma() {
    let out = translate("title, 'My Ring';\n");
    assert!(has_line(&out, "title, 'My Ring'"), "{}", out);
    let out = translate("title'My Ring';\n");
    assert!(has_line(&out, "title, 'My Ring'"), "{}", out);
}

#[test]
fn test_line_definition_passthrough() {
    let out = translate("q1: quadrupole, l = 1;\nfodo: line = (q1, q1);\n");
    assert!(has_line(&out, "fodo: line = (q1, q1)"), "{}", out);
}

#[test]
fn test_seqedit_install() {
    let out = translate(
        "seqedit, sequence = ring;\n\
         install, element = m1, class = marker, at = 3.5;\n\
         endedit;\n",
    );
    assert!(has_line(&out, "m1: marker"), "{}", out);
    assert!(
        has_line(&out, "superimpose, element = m1, ref = ring_mark, offset = 3.5"),
        "{}",
        out
    );
}

#[test]
fn test_install_with_from() {
    let out = translate("install, element = m1, at = 1, from = ip5;\n");
    assert!(
        has_line(&out, "superimpose, element = m1, ref = ip5, offset = 1"),
        "{}",
        out
    );
}

#[test]
fn test_control_flow_skipped() {
    let out = translate("if (x > 0) { q: quadrupole, l = 1; }\ny = 2;\n");
    assert!(!out.contains("quadrupole"), "{}", out);
    assert!(has_line(&out, "y = 2"), "{}", out);
}

#[test]
fn test_macro_skipped() {
    let out = translate("m1(a): macro = { q->k1 = a; };\nx = 1;\n");
    assert!(!out.contains("[k1]"), "{}", out);
    assert!(has_line(&out, "x = 1"), "{}", out);
}

#[test]
fn test_silent_and_warned_skips_produce_no_output() {
    let out = translate("select, flag = twiss;\ncycle, start = ip1;\nvalue, x;\n");
    for needle in ["select", "cycle", "value"] {
        assert!(!out.contains(needle), "{}", out);
    }
}

#[test]
fn test_unknown_construct_is_dropped() {
    let out = translate("gibberish here now;\nx = 1;\n");
    assert!(!out.contains("gibberish"), "{}", out);
    assert!(has_line(&out, "x = 1"), "{}", out);
}

// ── Comments and passthrough ──

#[test]
fn test_comment_forms() {
    let out = translate("! plain note\n// slashed note\nx = 1;\n");
    assert!(has_line(&out, "! plain note"), "{}", out);
    assert!(has_line(&out, "! slashed note"), "{}", out);
}

#[test]
fn test_verbatim_passthrough() {
    let out = translate("!!verbatim foo\nx = 1;\n");
    assert!(has_line(&out, "foo"), "{}", out);
}

#[test]
fn test_block_comment() {
    let out = translate("x /* why not */ = 1;\n");
    assert!(has_line(&out, "! why not "), "{}", out);
    assert!(has_line(&out, "x = 1"), "{}", out);
}

// ── Header and structure ──

#[test]
fn test_provenance_header() {
    let out = translate("x = 1;\n");
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "!+");
    assert_eq!(lines[1], "! Translated from MADX to Bmad by madx2bmad");
    assert_eq!(lines[2], "! File: lattice.madx");
    assert_eq!(lines[3], "!-");
}

#[test]
fn test_whole_file_snapshot() {
    let out = translate(
        "qk = 0.3;\n\
         q1: quadrupole, l = 0.5, k1 = qk;\n\
         b1: sbend, l = 1, tilt = 0.1;\n",
    );
    insta::assert_snapshot!(out, @r"
    !+
    ! Translated from MADX to Bmad by madx2bmad
    ! File: lattice.madx
    !-

    qk = 0.3

    q1: quadrupole, l = 0.5, k1 = qk
    b1: sbend, l = 1, ref_tilt = 0.1
    ");
}

#[test]
fn test_whole_sequence_snapshot() {
    let out = translate(
        "q1: quadrupole, l = 0.5;\n\
         seq: sequence, l = 4, refer = centre;\n\
         q1, at = 1;\n\
         endsequence;\n\
         use, seq;\n",
    );
    insta::assert_snapshot!(out, @r"
    !+
    ! Translated from MADX to Bmad by madx2bmad
    ! File: lattice.madx
    !-

    q1: quadrupole, l = 0.5
    drft0_seq: drift, l = 1 - 0.5/2
    drft1_seq: drift, l = 4 - (1 + 0.5/2)
    seq: line = (drft0_seq, q1, drft1_seq)
    use, seq
    ");
}

// ── File handling ──

#[test]
fn test_call_single_file_mode() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sub = dir.path().join("sub.madx");
    std::fs::write(&sub, "q2: quadrupole, l = 1;\n").expect("write sub");
    let root = dir.path().join("main.madx");
    std::fs::write(
        &root,
        format!("q1: quadrupole, l = 0.5;\ncall, file = \"{}\";\nx = 1;\n", sub.display()),
    )
    .expect("write root");

    let mut translator =
        Translator::from_file(root.to_str().expect("utf8 path"), Options::default())
            .expect("open root");
    translator.run();
    let files = translator.finish();
    assert_eq!(files.len(), 1);
    let out = &files[0].1;
    assert!(out.contains("! In File:"), "{}", out);
    assert!(has_line(out, "q2: quadrupole, l = 1"), "{}", out);
    assert!(has_line(out, "x = 1"), "{}", out);
}

#[test]
fn test_call_many_files_mode() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sub = dir.path().join("sub.madx");
    std::fs::write(&sub, "q2: quadrupole, l = 1;\n").expect("write sub");
    let root = dir.path().join("main.madx");
    std::fs::write(
        &root,
        format!("call, file = \"{}\";\nx = 1;\n", sub.display()),
    )
    .expect("write root");

    let opts = Options {
        one_file: false,
        ..Options::default()
    };
    let mut translator =
        Translator::from_file(root.to_str().expect("utf8 path"), opts).expect("open root");
    translator.run();
    let files = translator.finish();
    assert_eq!(files.len(), 2);
    assert!(files[0].0.ends_with("main.bmad"));
    assert!(files[0].1.contains("call, file ="), "{}", files[0].1);
    assert!(files[1].0.ends_with("sub.bmad"));
    assert!(files[1].1.contains("q2: quadrupole, l = 1"), "{}", files[1].1);
}

#[test]
fn test_exit_stops_translation() {
    let out = translate("x = 1;\nstop;\ny = 2;\n");
    assert!(has_line(&out, "x = 1"), "{}", out);
    assert!(!out.contains("y = 2"), "{}", out);
}
