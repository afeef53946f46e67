use approx::assert_abs_diff_eq;
use metastate_chain::{StateLabels, TransitionMatrix};
use metastate_gpcca::{
    AssignmentRule, GpccaError, MembershipConfig, TerminalSelection, coarse_grain,
    compute_memberships, select_terminal,
};
use metastate_linalg::CsrMatrix;
use metastate_spectral::{SchurConfig, SchurMethod, schur_decompose};

const WELL: usize = 10;

/// Three wells of ten states on a path. The link between wells 0 and 1
/// leaks 0.001, the link between wells 1 and 2 leaks 0.01.
fn three_wells() -> TransitionMatrix {
    let n = 3 * WELL;
    let rate = |i: usize| -> f64 {
        // Rate of the edge between i and i + 1.
        match i + 1 {
            b if b == WELL => 0.001,
            b if b == 2 * WELL => 0.01,
            _ => 0.25,
        }
    };
    let mut triplets = Vec::new();
    for i in 0..n {
        let left = if i > 0 { rate(i - 1) } else { 0.0 };
        let right = if i + 1 < n { rate(i) } else { 0.0 };
        if i > 0 {
            triplets.push((i, i - 1, left));
        }
        if i + 1 < n {
            triplets.push((i, i + 1, right));
        }
        triplets.push((i, i, 1.0 - left - right));
    }
    TransitionMatrix::from_sparse(CsrMatrix::from_triplets(n, n, triplets).unwrap()).unwrap()
}

fn well_of(state: usize) -> usize {
    state / WELL
}

// ---------------------------------------------------------------------------
// 1. memberships_are_stochastic_for_every_m
// ---------------------------------------------------------------------------
#[test]
fn memberships_are_stochastic_for_every_m() {
    let p = three_wells();
    let schur = schur_decompose(
        &p,
        &SchurConfig::new()
            .with_n_components(5)
            .with_method(SchurMethod::Direct),
    )
    .unwrap();
    assert_eq!(schur.n_components(), 5);
    for m in 2..=5 {
        let chi = compute_memberships(&schur, &MembershipConfig::new(m)).unwrap();
        assert_eq!(chi.memberships().dim(), (3 * WELL, m));
        for row in chi.memberships().rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-6);
            assert!(row.iter().all(|&v| v >= 0.0));
        }
        assert!(chi.crispness() > 0.0 && chi.crispness() <= 1.0 + 1e-9);
        assert_eq!(chi.representatives().len(), m);
    }
}

// ---------------------------------------------------------------------------
// 2. three_macrostates_recover_the_wells
// ---------------------------------------------------------------------------
#[test]
fn three_macrostates_recover_the_wells() {
    let p = three_wells();
    let schur = schur_decompose(&p, &SchurConfig::new().with_n_components(4)).unwrap();
    let chi = compute_memberships(&schur, &MembershipConfig::new(3)).unwrap();
    let mem = chi.memberships();

    let centre = [WELL / 2, WELL + WELL / 2, 2 * WELL + WELL / 2];
    let owner: Vec<usize> = centre
        .iter()
        .map(|&s| {
            let row = mem.row(s);
            (0..3).max_by(|&a, &b| row[a].total_cmp(&row[b])).unwrap()
        })
        .collect();
    let mut distinct = owner.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), 3, "owners {owner:?}");
    for (w, &s) in centre.iter().enumerate() {
        assert!(mem[[s, owner[w]]] > 0.9, "state {s}: {:?}", mem.row(s));
    }

    let coarse = coarse_grain(&p, &chi, None).unwrap();
    for row in coarse.matrix().rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-10);
    }
    // Fuzzy memberships smear the 0.01 leak over the well boundary, so the
    // two wells next to it keep only about 0.9 of their mass.
    for (k, row) in coarse.matrix().rows().into_iter().enumerate() {
        assert!(row[k] > 0.85, "macrostate {k}: {row}");
    }
    assert!(coarse.diagonal().sum() > 2.6);
}

// ---------------------------------------------------------------------------
// 3. eigengap_selects_all_wells
// ---------------------------------------------------------------------------
#[test]
fn eigengap_selects_all_wells() {
    let p = three_wells();
    let schur = schur_decompose(&p, &SchurConfig::new().with_n_components(4)).unwrap();
    assert_eq!(schur.eigengap(), 2);
    let chi = compute_memberships(&schur, &MembershipConfig::new(3)).unwrap();
    let coarse = coarse_grain(&p, &chi, None).unwrap();
    let terminal = select_terminal(
        &coarse,
        &chi,
        schur.eigengap(),
        &TerminalSelection::Eigengap,
        AssignmentRule::TopN { n_cells: 5 },
    )
    .unwrap();
    assert_eq!(terminal.n_terminal(), 3);
    for t in 0..3 {
        let states = terminal.states_of(t);
        assert_eq!(states.len(), 5);
        let w = well_of(states[0]);
        assert!(states.iter().all(|&s| well_of(s) == w), "{states:?}");
    }
}

// ---------------------------------------------------------------------------
// 4. top_n_prefers_the_most_stable_wells
// ---------------------------------------------------------------------------
#[test]
fn top_n_prefers_the_most_stable_wells() {
    let p = three_wells();
    let schur = schur_decompose(&p, &SchurConfig::new().with_n_components(4)).unwrap();
    let chi = compute_memberships(&schur, &MembershipConfig::new(3)).unwrap();
    let coarse = coarse_grain(&p, &chi, None).unwrap();
    let terminal = select_terminal(
        &coarse,
        &chi,
        schur.eigengap(),
        &TerminalSelection::TopN(2),
        AssignmentRule::Argmax { threshold: 0.5 },
    )
    .unwrap();
    assert_eq!(terminal.n_terminal(), 2);
    let mut wells: Vec<usize> = (0..2)
        .map(|t| well_of(terminal.states_of(t)[0]))
        .collect();
    wells.sort_unstable();
    // Well 1 leaks through both of its links.
    assert_eq!(wells, vec![0, 2]);
    // States of the unselected well stay unassigned.
    assert!(terminal.assignment()[WELL + WELL / 2].is_none());
}

// ---------------------------------------------------------------------------
// 5. joint_macrostates_merge_memberships
// ---------------------------------------------------------------------------
#[test]
fn joint_macrostates_merge_memberships() {
    let p = three_wells();
    let schur = schur_decompose(&p, &SchurConfig::new().with_n_components(4)).unwrap();
    let labels = StateLabels::new(
        (0..3 * WELL)
            .map(|s| ["Alpha", "Beta", "Gamma"][well_of(s)].to_string())
            .collect(),
    );
    let chi = compute_memberships(&schur, &MembershipConfig::new(3).with_n_cells(5))
        .unwrap()
        .with_labels(&labels)
        .unwrap();
    let mut names = chi.names().to_vec();
    names.sort();
    assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);

    let coarse = coarse_grain(&p, &chi, None).unwrap();
    let selection = TerminalSelection::Macrostates(vec!["Alpha, Beta".to_string(), "Gamma".to_string()]);
    let terminal = select_terminal(&coarse, &chi, 0, &selection, AssignmentRule::default()).unwrap();
    assert_eq!(terminal.names(), ["Alpha, Beta", "Gamma"]);
    assert_eq!(terminal.macrostates()[0].len(), 2);

    let alpha = chi.position("Alpha").unwrap();
    let beta = chi.position("Beta").unwrap();
    for s in 0..3 * WELL {
        let expected = chi.memberships()[[s, alpha]] + chi.memberships()[[s, beta]];
        assert_abs_diff_eq!(terminal.memberships()[[s, 0]], expected, epsilon = 1e-12);
    }

    let unknown = TerminalSelection::Macrostates(vec!["Delta".to_string()]);
    let err = select_terminal(&coarse, &chi, 0, &unknown, AssignmentRule::default()).unwrap_err();
    assert!(matches!(err, GpccaError::UnknownMacrostate { .. }));
}

// ---------------------------------------------------------------------------
// 6. split_conjugate_pair_is_rejected
// ---------------------------------------------------------------------------
#[test]
fn split_conjugate_pair_is_rejected() {
    // Lazy walk on a directed cycle: eigenvalue 1, then a complex pair.
    let n = 8;
    let mut triplets = Vec::new();
    for i in 0..n {
        triplets.push((i, i, 0.5));
        triplets.push((i, (i + 1) % n, 0.5));
    }
    let p = TransitionMatrix::from_sparse(CsrMatrix::from_triplets(n, n, triplets).unwrap())
        .unwrap();
    let schur = schur_decompose(
        &p,
        &SchurConfig::new()
            .with_n_components(3)
            .with_method(SchurMethod::Direct),
    )
    .unwrap();
    assert_eq!(schur.n_components(), 3);
    let err = compute_memberships(&schur, &MembershipConfig::new(2)).unwrap_err();
    assert!(matches!(err, GpccaError::SplitsConjugatePair { m: 2 }));
    assert!(err.is_contract_violation());
}
