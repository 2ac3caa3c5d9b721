//! Confirms `set_log_level` maps every accepted name to the right
//! `LevelFilter`, and that an unrecognised name leaves it unchanged.
//!
//! Single test function: `log::max_level()` is a process-wide atomic, and
//! `cargo test` runs tests within one binary on separate threads, so two
//! tests mutating it independently would race.

#[test]
fn set_log_level_maps_every_name_and_ignores_unknowns() {
    let cases = [
        ("none", log::LevelFilter::Off),
        ("warning", log::LevelFilter::Warn),
        ("error", log::LevelFilter::Error),
        ("info", log::LevelFilter::Info),
        ("debug", log::LevelFilter::Debug),
    ];
    for (name, expected) in cases {
        zbc::set_log_level(name);
        assert_eq!(log::max_level(), expected, "level mismatch for {name:?}");
    }

    zbc::set_log_level("info");
    zbc::set_log_level("not-a-level");
    assert_eq!(log::max_level(), log::LevelFilter::Info);
}
