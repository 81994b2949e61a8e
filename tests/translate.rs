//! End-to-end translations.

use harmonizer::dialect::parse_dunesql;
use harmonizer::optimizer::TypeKind;
use harmonizer::postprocess::{ARRAY_WARNING, BANNER, BYTEA_PARAMETER_WARNING, GENERATED_VIEW_WARNING};
use harmonizer::prelude::*;
use harmonizer::render::Renderer;
use pretty_assertions::assert_eq;

/// Translated query without the banner and warnings.
fn body(sql: &str, options: &Translation) -> String {
    let out = translate(sql, &options.clone().pretty(false)).unwrap();
    out.rsplit("*/\n\n").next().unwrap_or_default().to_string()
}

fn spark(sql: &str) -> String {
    body(sql, &Translation::spark())
}

fn postgres(sql: &str) -> String {
    body(sql, &Translation::postgres().chain("ethereum"))
}

fn postgres_syntax(sql: &str) -> String {
    body(sql, &Translation::postgres().syntax_only(true))
}

#[test]
fn hex_spellings_converge() {
    assert_eq!(
        spark("SELECT X'deadbeef', x'deadbeef', '0xdeadbeef'"),
        "SELECT 0xdeadbeef, 0xdeadbeef, 0xdeadbeef"
    );
    assert_eq!(postgres_syntax("SELECT '\\xDEADBEEF'"), "SELECT 0xdeadbeef");
}

#[test]
fn boolean_strings_become_booleans() {
    assert_eq!(
        spark("SELECT * FROM t WHERE a = 'true' AND b = 'False' AND c = CAST('TRUE' AS BOOLEAN)"),
        "SELECT * FROM t WHERE a = true AND b = false AND c = CAST('TRUE' AS BOOLEAN)"
    );
}

#[test]
fn explode_collision_naming() {
    assert_eq!(
        spark("SELECT col, explode(sequence(2,3)) FROM array_column"),
        "SELECT col, col_2 FROM array_column CROSS JOIN UNNEST(SEQUENCE(2, 3)) AS array_column(col_2)"
    );
}

#[test]
fn posexplode_ordering() {
    assert_eq!(
        spark("SELECT posexplode(sequence(2,3)) FROM t"),
        "SELECT pos, col FROM t CROSS JOIN UNNEST(SEQUENCE(2, 3)) WITH ORDINALITY AS array_column(col, pos)"
    );
}

#[test]
fn spark_null_ordering_made_explicit() {
    assert_eq!(
        spark("SELECT a FROM t ORDER BY a, b DESC"),
        "SELECT a FROM t ORDER BY a NULLS FIRST, b DESC"
    );
    assert_eq!(
        postgres_syntax("SELECT a FROM t ORDER BY a DESC"),
        "SELECT a FROM t ORDER BY a DESC"
    );
}

#[test]
fn postgres_casts_and_intervals() {
    assert_eq!(
        postgres_syntax("SELECT a::int, b::varchar(10) FROM t WHERE ts > now() - interval '2 weeks'"),
        "SELECT CAST(a AS INTEGER), CAST(b AS VARCHAR) FROM t WHERE ts > NOW() - INTERVAL '14' DAY"
    );
}

#[test]
fn schema_casts_the_literal_side() {
    let schema = Schema::new().with_table("tbl", [("col", TypeKind::Double)]);
    assert_eq!(
        body("SELECT col = 1 FROM tbl", &Translation::spark().schema(schema)),
        "SELECT tbl.col = CAST(1 AS DOUBLE) AS _col_0 FROM tbl"
    );
}

#[test]
fn schema_decodes_hex_text_for_binary_columns() {
    let schema = Schema::new().with_table("tbl", [("col", TypeKind::Varbinary)]);
    assert_eq!(
        body("SELECT col = '0xdeadbeef' FROM tbl", &Translation::spark().schema(schema)),
        "SELECT tbl.col = FROM_HEX('deadbeef') AS _col_0 FROM tbl"
    );
}

#[test]
fn schema_unknown_column() {
    let schema = Schema::new().with_table("tbl", [("x", TypeKind::Integer)]);
    let err = translate("SELECT col FROM tbl", &Translation::spark().schema(schema)).unwrap_err();
    assert!(matches!(err, TranslationError::UnknownColumn { ref column, .. } if column == "col"));
}

#[test]
fn parameters_round_trip() {
    assert_eq!(
        postgres_syntax(
            "SELECT * FROM t WHERE block_time > '{{ start_time }}' AND address = '{{ address }}'"
        ),
        "SELECT * FROM t WHERE block_time > CAST('{{ start_time }}' AS TIMESTAMP) AND address = '{{ address }}'"
    );
}

#[test]
fn chain_predicate_at_every_level() {
    assert_eq!(
        postgres(
            "SELECT * FROM (SELECT token_b_address FROM dex.trades WHERE block_number > 100) AS big \
             JOIN prices.usd AS p ON p.contract_address = big.token_b_address"
        ),
        "SELECT * FROM (SELECT token_bought_address FROM dex.trades WHERE blockchain = 'ethereum' \
         AND block_number > 100) AS big JOIN prices.usd AS p ON p.contract_address = big.token_bought_address \
         WHERE p.blockchain = 'ethereum'"
    );
}

#[test]
fn legacy_tables_renamed() {
    assert_eq!(
        postgres("SELECT * FROM erc20.\"ERC20_evt_Transfer\" AS e JOIN uniswap.\"Pair_evt_Swap\" AS s ON e.evt_tx_hash = s.evt_tx_hash"),
        "SELECT * FROM erc20_ethereum.evt_Transfer AS e JOIN uniswap_ethereum.\"Pair_evt_Swap\" AS s ON e.evt_tx_hash = s.evt_tx_hash"
    );
    let options = Translation::postgres().chain("gnosis").table("erc20.tokens", "my_tokens.erc20");
    assert_eq!(
        body("SELECT symbol FROM erc20.tokens", &options),
        "SELECT symbol FROM my_tokens.erc20"
    );
}

#[test]
fn syntax_only_keeps_tables() {
    assert_eq!(postgres_syntax("SELECT * FROM dex.trades"), "SELECT * FROM dex.trades");
}

#[test]
fn banner_and_warnings() {
    let out = translate("SELECT xs[1] FROM t", &Translation::spark()).unwrap();
    assert!(out.starts_with(&format!("{}\n\n{}\n\n", BANNER, ARRAY_WARNING)));

    let out = migrate_postgres("SELECT * FROM dune_user_generated.v", "ethereum").unwrap();
    assert!(out.starts_with(BANNER));
    assert!(out.contains(GENERATED_VIEW_WARNING));

    let out = translate(
        "SELECT * FROM t WHERE a = lower('{{address}}')",
        &Translation::postgres().syntax_only(true).pretty(false),
    )
    .unwrap();
    assert!(out.contains(BYTEA_PARAMETER_WARNING));
    assert!(out.ends_with("WHERE a = {{address}}"));
}

#[test]
fn printing_dunesql_is_idempotent() {
    let renderer = Renderer::dunesql(false);
    for sql in [
        "SELECT a, CAST(b AS UINT256) FROM t WHERE c = 0xab ORDER BY a NULLS FIRST LIMIT 5",
        "WITH x AS (SELECT 1 AS n) SELECT n FROM x CROSS JOIN UNNEST(ARRAY[1, 2]) AS u(v)",
    ] {
        let once = renderer.render(&mut parse_dunesql(sql).unwrap());
        let twice = renderer.render(&mut parse_dunesql(&once).unwrap());
        assert_eq!(once, twice);
    }
}

#[test]
fn postgres_bytea_literal_against_binary_column() {
    let schema = Schema::new().with_table("t", [("addr", TypeKind::Varbinary)]);
    let options = Translation::postgres().syntax_only(true).schema(schema);
    assert_eq!(
        body("SELECT addr FROM t WHERE addr = '\\xdeadbeef'", &options),
        "SELECT t.addr FROM t WHERE t.addr = 0xdeadbeef"
    );
    assert_eq!(
        body("SELECT addr FROM t WHERE addr = 'abc'", &options),
        "SELECT t.addr FROM t WHERE t.addr = CAST('abc' AS VARBINARY)"
    );
}

#[test]
fn interval_overflow_left_as_written() {
    assert_eq!(
        postgres_syntax("SELECT now() - interval '2000000000000000000 weeks'"),
        "SELECT NOW() - INTERVAL '2000000000000000000 weeks'"
    );
}

#[test]
fn chain_predicate_unless_same_chain_pinned() {
    assert_eq!(
        postgres("SELECT * FROM dex.trades WHERE blockchain IS NOT NULL"),
        "SELECT * FROM dex.trades WHERE blockchain = 'ethereum' AND blockchain IS NOT NULL"
    );
    assert_eq!(
        postgres("SELECT * FROM dex.trades WHERE blockchain = 'bnb'"),
        "SELECT * FROM dex.trades WHERE blockchain = 'ethereum' AND blockchain = 'bnb'"
    );
    assert_eq!(
        postgres("SELECT * FROM dex.trades WHERE blockchain = 'ethereum'"),
        "SELECT * FROM dex.trades WHERE blockchain = 'ethereum'"
    );
}

#[test]
fn array_constructor_has_no_index_warning() {
    let out = translate("SELECT array(1, 2) AS xs", &Translation::spark().pretty(false)).unwrap();
    assert!(!out.contains(ARRAY_WARNING), "{}", out);
    assert!(out.ends_with("SELECT ARRAY[1, 2] AS xs"), "{}", out);

    let out = translate("SELECT xs[1] FROM t", &Translation::spark()).unwrap();
    assert!(out.contains(ARRAY_WARNING));
}

#[test]
fn parenthesised_category_filter_dropped() {
    assert_eq!(
        postgres("SELECT 1 FROM dex.trades WHERE (category = 'DEX') AND x = 1"),
        "SELECT 1 FROM dex.trades WHERE blockchain = 'ethereum' AND x = 1"
    );
}
