// crates/tmcdb-rs/tests/robustness.rs

//! Behavior on hostile or incomplete input: malformed documents abort,
//! malformed annotations skip their own chain, everything else keeps
//! going.

use tmcdb_rs::{
    generate, BuildOptions, DbdFile, Severity, TmcDbError, TmcProject,
};

fn fixture(symbols: &str) -> String {
    format!(
        r#"<TcModuleClass>
  <Module>
    <Name>PlcTask</Name>
    <DataArea>{symbols}</DataArea>
  </Module>
</TcModuleClass>"#
    )
}

fn scalar_symbol(name: &str, pragma_value: &str) -> String {
    format!(
        r#"<Symbol>
  <Name>{name}</Name>
  <BitSize>64</BitSize>
  <BitOffs>0</BitOffs>
  <BaseType>LREAL</BaseType>
  <Properties>
    <Property><Name>pytmc</Name><Value>{pragma_value}</Value></Property>
  </Properties>
</Symbol>"#
    )
}

fn tolerant() -> BuildOptions {
    BuildOptions {
        allow_errors: true,
        ..BuildOptions::default()
    }
}

#[test]
fn test_malformed_xml_is_fatal() {
    assert!(matches!(
        TmcProject::parse("<TcModuleClass><Unclosed></TcModuleClass>"),
        Err(TmcDbError::MalformedXml(_))
    ));
    assert!(matches!(
        TmcProject::parse("not xml at all"),
        Err(TmcDbError::MalformedXml(_))
    ));
}

#[test]
fn test_framed_pragma_is_unwrapped() {
    let xml = fixture(&scalar_symbol(
        "Main.framed",
        "{attribute 'pytmc' := 'pv: TEST:FRAMED; io: i'}",
    ));
    let project = TmcProject::parse(&xml).unwrap();
    let generated = generate(&project, None, &BuildOptions::default()).unwrap();
    assert!(generated.database.contains("record(ai, \"TEST:FRAMED\")"));
}

#[test]
fn test_unbalanced_framing_skips_only_that_chain() {
    let symbols = format!(
        "{}{}",
        scalar_symbol("Main.good", "pv: TEST:GOOD; io: i"),
        scalar_symbol("Main.bad", "{attribute 'pytmc' := 'pv: TEST:BAD'"),
    );
    let project = TmcProject::parse(&fixture(&symbols)).unwrap();

    assert!(matches!(
        generate(&project, None, &BuildOptions::default()),
        Err(TmcDbError::MalformedPragma { .. })
    ));

    let generated = generate(&project, None, &tolerant()).unwrap();
    assert!(generated.database.contains("TEST:GOOD"));
    assert!(!generated.database.contains("TEST:BAD"));
    assert_eq!(generated.errors.len(), 1);
}

#[test]
fn test_symbols_without_pragmas_are_ignored() {
    let xml = fixture(
        r#"<Symbol>
  <Name>Main.plain</Name>
  <BitSize>64</BitSize>
  <BitOffs>0</BitOffs>
  <BaseType>LREAL</BaseType>
</Symbol>"#,
    );
    let project = TmcProject::parse(&xml).unwrap();
    let generated = generate(&project, None, &BuildOptions::default()).unwrap();
    assert!(generated.packages.is_empty());
    assert!(generated.errors.is_empty());
    assert_eq!(generated.database, "");
}

#[test]
fn test_invalid_update_value_is_an_invalid_chain() {
    let xml = fixture(&scalar_symbol(
        "Main.odd",
        "pv: TEST:ODD; io: i; update: whenever",
    ));
    let project = TmcProject::parse(&xml).unwrap();
    let generated = generate(&project, None, &tolerant()).unwrap();
    assert!(generated.packages.is_empty());
    assert!(matches!(
        &generated.errors[0],
        TmcDbError::InvalidChain { tcname, .. } if tcname == "Main.odd"
    ));
}

#[test]
fn test_unknown_pragma_keys_are_ignored() {
    let xml = fixture(&scalar_symbol(
        "Main.extra",
        "pv: TEST:EXTRA; io: i; sparkle: yes",
    ));
    let project = TmcProject::parse(&xml).unwrap();
    let generated = generate(&project, None, &BuildOptions::default()).unwrap();
    assert!(generated.database.contains("TEST:EXTRA"));
    assert!(generated.errors.is_empty());
}

#[test]
fn test_unresolved_type_skips_chain() {
    let xml = fixture(
        r#"<Symbol>
  <Name>Main.mystery</Name>
  <BitSize>64</BitSize>
  <BitOffs>0</BitOffs>
  <BaseType>ST_DoesNotExist</BaseType>
  <Properties>
    <Property><Name>pytmc</Name><Value>pv: TEST:MYSTERY; io: i</Value></Property>
  </Properties>
</Symbol>"#,
    );
    let project = TmcProject::parse(&xml).unwrap();
    let generated = generate(&project, None, &tolerant()).unwrap();
    assert!(generated.packages.is_empty());
    assert!(matches!(
        &generated.errors[0],
        TmcDbError::UnresolvedType { type_name, .. } if type_name == "ST_DoesNotExist"
    ));
}

const TRIMMED_DBD: &str = r#"
menu(menuScan) {
    choice(menuScanPassive, "Passive")
    choice(menuScan1_second, "1 second")
}
recordtype(ai) {
    field(SCAN, DBF_MENU) { menu(menuScan) }
    field(DTYP, DBF_DEVICE)
    field(INP, DBF_INLINK)
    field(PREC, DBF_SHORT)
    field(DESC, DBF_STRING)
    field(ASG, DBF_STRING)
    field(PINI, DBF_SHORT)
    field(TSE, DBF_SHORT)
}
"#;

#[test]
fn test_lint_rejects_unknown_fields() {
    let xml = fixture(&scalar_symbol(
        "Main.flow",
        "pv: TEST:FLOW; io: i; field: NOTAFIELD 7",
    ));
    let project = TmcProject::parse(&xml).unwrap();
    let dbd = DbdFile::parse(TRIMMED_DBD).unwrap();

    assert!(matches!(
        generate(&project, Some(&dbd), &BuildOptions::default()),
        Err(TmcDbError::Lint { .. })
    ));

    let generated = generate(&project, Some(&dbd), &tolerant()).unwrap();
    // Error tolerance keeps the record but reports the finding.
    assert!(generated.database.contains("TEST:FLOW"));
    assert!(generated
        .lint
        .iter()
        .any(|message| message.severity == Severity::Error
            && message.message.contains("NOTAFIELD")));
}

#[test]
fn test_lint_passes_clean_records() {
    let xml = fixture(&scalar_symbol("Main.clean", "pv: TEST:CLEAN; io: i"));
    let project = TmcProject::parse(&xml).unwrap();
    let dbd = DbdFile::parse(TRIMMED_DBD).unwrap();
    let generated = generate(&project, Some(&dbd), &BuildOptions::default()).unwrap();
    assert!(generated.lint.is_empty());
    assert!(generated.database.contains("TEST:CLEAN"));
}
