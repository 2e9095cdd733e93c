// Known AcqKnowledge file revisions, used to gate header schemas.
//
// The revision integer lives at the start of the graph header. The mapping
// to marketing version numbers was established by inspecting files; the
// gaps are real -- nobody has seen every revision in the wild.

pub const V_ALL: u32 = 0;
pub const V_20A: u32 = 30;
pub const V_20B: u32 = 31;
pub const V_20R: u32 = 32;
pub const V_207: u32 = 33;
pub const V_30R: u32 = 34;
pub const V_303: u32 = 35;
pub const V_35X: u32 = 36;
pub const V_36X: u32 = 37;
pub const V_370: u32 = 38;
pub const V_373: u32 = 39;
pub const V_381: u32 = 41;
pub const V_37P: u32 = 42;
pub const V_382: u32 = 43;
pub const V_38P: u32 = 44;
pub const V_390: u32 = 45;
pub const V_400B: u32 = 61;
pub const V_400: u32 = 68;
pub const V_401: u32 = 76;
pub const V_402: u32 = 78;
pub const V_41A: u32 = 80;
pub const V_410: u32 = 83;
pub const V_411: u32 = 84;
pub const V_420: u32 = 108;
pub const V_42X: u32 = 121;
pub const V_430: u32 = 124;
pub const V_440: u32 = 128;
pub const V_501: u32 = 132;

/// The earliest revision the reader knows how to parse.
pub const EARLIEST_KNOWN: u32 = V_20A;

/// Largest revision value accepted during endianness detection. Revisions
/// past the newest known one still parse (trailing fields are simply
/// absent), but a "version" outside this range means we guessed the byte
/// order wrong.
pub const LATEST_PLAUSIBLE: u32 = 200;

const NAMED: &[(u32, &str)] = &[
    (V_20A, "2.0a"),
    (V_20B, "2.0b"),
    (V_20R, "2.0r"),
    (V_207, "2.0.7"),
    (V_30R, "3.0r"),
    (V_303, "3.0.3"),
    (V_35X, "3.5.x"),
    (V_36X, "3.6.x"),
    (V_370, "3.7.0"),
    (V_373, "3.7.3"),
    (V_381, "3.8.1"),
    (V_37P, "3.7.P"),
    (V_382, "3.8.2"),
    (V_38P, "3.8.P"),
    (V_390, "3.9.0"),
    (V_400B, "4.0.0B"),
    (V_400, "4.0.0"),
    (V_401, "4.0.1"),
    (V_402, "4.0.2"),
    (V_41A, "4.1.a"),
    (V_410, "4.1.0"),
    (V_411, "4.1.1"),
    (V_420, "4.2.0"),
    (V_42X, "4.2.x"),
    (V_430, "4.3.0"),
    (V_440, "4.4.0"),
    (V_501, "5.0.1"),
];

/// Best-effort AcqKnowledge version string for a revision number.
pub fn version_string_guess(revision: u32) -> String {
    if let Some((_, name)) = NAMED.iter().find(|(r, _)| *r == revision) {
        return (*name).to_string();
    }
    let first = NAMED[0].0;
    let last = NAMED[NAMED.len() - 1];
    if revision < first {
        return "unknown early version".to_string();
    }
    if revision > last.0 {
        return format!("after {}", last.1);
    }
    let next = NAMED.iter().position(|(r, _)| *r > revision).unwrap();
    format!("between {} and {}", NAMED[next - 1].1, NAMED[next].1)
}
