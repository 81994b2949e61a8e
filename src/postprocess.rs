//! Final text touch-ups: parameter unwrapping, warnings and the banner.

use std::sync::LazyLock;

use regex::Regex;

static LOWERED_PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)lower\(\s*['"]\{\{(.*?)\}\}['"]\s*\)"#).expect("valid lowered parameter pattern")
});
static LOWERED_HEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)lower\(\s*'(0x[0-9a-f]*)'\s*\)").expect("valid lowered hex pattern")
});
/// A subscript: `[` right after a name, a closing bracket or a quoted name.
static ARRAY_INDEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z0-9_]+|[)\]"])\s*\["#).expect("valid array index pattern")
});

pub const BYTEA_PARAMETER_WARNING: &str = "/* !Bytea parameter warning: Make sure to change \\x to 0x in the parameters, bytea types are native now (no need for quotes or lower or \\x)' */";
pub const ARRAY_WARNING: &str = "/* !Array warning: Arrays in dune SQL are indexed from 1, not 0. The migrator will not catch this if you indexed using variables */";
pub const GENERATED_VIEW_WARNING: &str = "/* !Generated view warning: you can't query views in dune_user_generated anymore. All queries in DuneSQL are by default views though (try querying the table 'query_1747157') */";
pub const BANNER: &str = "/* Success! If you're still running into issues, check out https://dune.com/docs/query/syntax-differences/ or reach out in the #dune-sql Discord channel. */";

/// Whether `query` subscripts an array. `ARRAY[..]` constructors do not count.
fn indexes_array(query: &str) -> bool {
    ARRAY_INDEX
        .captures_iter(query)
        .any(|c| !c[1].eq_ignore_ascii_case("array"))
}

/// Unwrap lowered parameters and hex strings, then prepend warnings and the
/// banner, banner first.
pub fn finish(query: &str) -> String {
    let unwrapped = LOWERED_PARAMETER.replace_all(query, "{{$1}}");
    let bytea = unwrapped != query;
    let unwrapped = LOWERED_HEX.replace_all(&unwrapped, "'$1'").into_owned();

    let mut blocks = vec![BANNER];
    if bytea {
        blocks.push(BYTEA_PARAMETER_WARNING);
    }
    if indexes_array(&unwrapped) {
        blocks.push(ARRAY_WARNING);
    }
    if unwrapped.to_lowercase().contains("dune_user_generated") {
        blocks.push(GENERATED_VIEW_WARNING);
    }

    let mut out = String::new();
    for block in blocks {
        out.push_str(block);
        out.push_str("\n\n");
    }
    out.push_str(&unwrapped);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_banner_only() {
        assert_eq!(finish("SELECT 1"), format!("{}\n\nSELECT 1", BANNER));
    }

    #[test]
    fn test_lowered_parameter_unwrapped_with_warning() {
        assert_eq!(
            finish("SELECT * FROM t WHERE a = LOWER('{{address}}')"),
            format!(
                "{}\n\n{}\n\nSELECT * FROM t WHERE a = {{{{address}}}}",
                BANNER, BYTEA_PARAMETER_WARNING
            )
        );
    }

    #[test]
    fn test_lowered_hex_unwrapped() {
        assert_eq!(
            finish("SELECT LOWER('0xAB')"),
            format!("{}\n\nSELECT '0xAB'", BANNER)
        );
    }

    #[test]
    fn test_warning_order() {
        let out = finish("SELECT xs[1] FROM dune_user_generated.v");
        let banner = out.find(BANNER).unwrap();
        let array = out.find(ARRAY_WARNING).unwrap();
        let view = out.find(GENERATED_VIEW_WARNING).unwrap();
        assert!(banner < array && array < view);
        assert!(out.ends_with("SELECT xs[1] FROM dune_user_generated.v"));
    }

    #[test]
    fn test_array_constructor_is_not_indexing() {
        assert!(!indexes_array("SELECT ARRAY[1, 2] AS xs"));
        assert!(!indexes_array("SELECT * FROM UNNEST(array [1]) AS u(v)"));
        assert!(indexes_array("SELECT xs[1] FROM t"));
        assert!(indexes_array("SELECT ARRAY[1, 2][1]"));
        assert!(indexes_array("SELECT \"xs\" [2] FROM t"));
        assert!(indexes_array("SELECT SPLIT(a, ',')[1] FROM t"));
    }
}
