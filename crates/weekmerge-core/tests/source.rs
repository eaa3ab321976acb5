use weekmerge_core::source::{hyphenate_release, render_release_query};

#[test]
fn release_pair_is_hyphenated_into_the_query() {
    let query = render_release_query(
        "SELECT * FROM charged WHERE ClusterKey IN :release",
        "SS 2025",
        "SS 2024",
    );
    assert_eq!(
        query,
        "SELECT * FROM charged WHERE ClusterKey IN ('SS-2025', 'SS-2024')"
    );
    assert_eq!(hyphenate_release("FW 2024"), "FW-2024");
}

#[test]
fn mangled_non_breaking_spaces_become_plain_spaces() {
    let template = "SELECT\u{c3}\u{201a}model\nFROM charged\nWHERE ClusterKey IN\u{c3}\u{201a}:release";
    let query = render_release_query(template, "SS 2025", "SS 2024");
    assert_eq!(
        query,
        "SELECT model\nFROM charged\nWHERE ClusterKey IN ('SS-2025', 'SS-2024')"
    );
    assert!(!query.contains('\u{c3}'));
}
