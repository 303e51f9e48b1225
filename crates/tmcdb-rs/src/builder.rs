// crates/tmcdb-rs/src/builder.rs

//! Deterministic textual emission of the record database and the archive
//! descriptor. Identical inputs produce byte-identical outputs: records
//! sort by their source name, fields by the fixed priority table, and no
//! hash-map iteration order is involved anywhere.

use crate::record::{format_seconds, ArchiveDescriptor, EpicsRecord, RecordPackage};

/// Quote a field value for the record grammar, escaping embedded quotes
/// and backslashes. Values arriving pre-quoted are unwrapped first.
fn quote(value: &str) -> String {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Archived fields beyond the implied `VAL`.
fn extra_archive_fields(archive: &ArchiveDescriptor) -> Vec<&str> {
    archive
        .fields
        .iter()
        .filter(|field| *field != "VAL")
        .map(String::as_str)
        .collect()
}

fn archive_info(archive: &ArchiveDescriptor) -> String {
    let mut info = format!(
        "{} {}",
        format_seconds(archive.seconds),
        archive.method.as_str()
    );
    for field in extra_archive_fields(archive) {
        info.push(' ');
        info.push_str(field);
    }
    info
}

fn render_record(
    output: &mut String,
    record: &EpicsRecord,
    archive: Option<&ArchiveDescriptor>,
) {
    output.push_str(&format!(
        "record({}, {}) {{\n",
        record.record_type,
        quote(&record.pvname)
    ));
    for (name, value) in record.fields.sorted() {
        output.push_str(&format!("    field({name}, {})\n", quote(&value)));
    }
    if !record.autosave_pass0.is_empty() {
        output.push_str(&format!(
            "    info(autosaveFields_pass0, {})\n",
            quote(&record.autosave_pass0.join(" "))
        ));
    }
    if !record.autosave_pass1.is_empty() {
        output.push_str(&format!(
            "    info(autosaveFields_pass1, {})\n",
            quote(&record.autosave_pass1.join(" "))
        ));
    }
    if let Some(archive) = archive {
        output.push_str(&format!(
            "    info(archive, {})\n",
            quote(&archive_info(archive))
        ));
    }
    output.push_str("}\n");
}

/// Packages in stable emission order: by source name, then by PV name for
/// virtual symbols that share one.
fn sorted<'p>(packages: &'p [RecordPackage]) -> Vec<&'p RecordPackage> {
    let mut ordered: Vec<&RecordPackage> = packages.iter().collect();
    ordered.sort_by(|a, b| {
        a.tcname
            .cmp(&b.tcname)
            .then_with(|| a.pvname.cmp(&b.pvname))
    });
    ordered
}

/// Serialize the record packages into a record-database text.
pub fn save_database_to_string(packages: &[RecordPackage]) -> String {
    let mut output = String::new();
    for (index, package) in sorted(packages).into_iter().enumerate() {
        for (record_index, record) in package.records.iter().enumerate() {
            if index + record_index > 0 {
                output.push('\n');
            }
            render_record(&mut output, record, package.archive.as_ref());
        }
    }
    output
}

/// Serialize the archive selections into a descriptor text: one line per
/// archived PV, `<pv> <period> <method> [<extra fields>]`.
pub fn save_archive_to_string(packages: &[RecordPackage]) -> String {
    let mut output = String::new();
    for package in sorted(packages) {
        let Some(archive) = &package.archive else {
            continue;
        };
        for record in &package.records {
            output.push_str(&format!("{} {}\n", record.pvname, archive_info(archive)));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pragma::{ArchiveMethod, IoDirection};
    use crate::record::FieldMap;

    fn package(tcname: &str, pvname: &str) -> RecordPackage {
        let mut fields = FieldMap::default();
        fields.set("SCAN", "1 second");
        fields.set("DTYP", "asynFloat64");
        fields.set("DESC", "a \"quoted\" description");
        RecordPackage {
            tcname: tcname.to_string(),
            pvname: pvname.to_string(),
            io: IoDirection::Input,
            records: vec![EpicsRecord {
                pvname: pvname.to_string(),
                record_type: "ai".to_string(),
                direction: IoDirection::Input,
                fields,
                autosave_pass0: vec!["DESC".to_string(), "DISS".to_string()],
                autosave_pass1: Vec::new(),
            }],
            archive: Some(ArchiveDescriptor {
                seconds: 1.0,
                method: ArchiveMethod::Scan,
                fields: vec!["SEVR".to_string(), "VAL".to_string()],
            }),
        }
    }

    #[test]
    fn test_render_single_record() {
        let rendered = save_database_to_string(&[package("Main.a", "TEST:A")]);
        assert_eq!(
            rendered,
            "record(ai, \"TEST:A\") {\n\
             \x20   field(DTYP, \"asynFloat64\")\n\
             \x20   field(SCAN, \"1 second\")\n\
             \x20   field(DESC, \"a \\\"quoted\\\" description\")\n\
             \x20   info(autosaveFields_pass0, \"DESC DISS\")\n\
             \x20   info(archive, \"1 scan SEVR\")\n\
             }\n"
        );
    }

    #[test]
    fn test_records_sort_by_source_name() {
        let packages = [package("Main.b", "TEST:B"), package("Main.a", "TEST:A")];
        let rendered = save_database_to_string(&packages);
        let first = rendered.find("TEST:A").unwrap();
        let second = rendered.find("TEST:B").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_byte_identical_output() {
        let packages = [package("Main.b", "TEST:B"), package("Main.a", "TEST:A")];
        assert_eq!(
            save_database_to_string(&packages),
            save_database_to_string(&packages)
        );
        assert_eq!(
            save_archive_to_string(&packages),
            save_archive_to_string(&packages)
        );
    }

    #[test]
    fn test_archive_lines() {
        let rendered = save_archive_to_string(&[package("Main.a", "TEST:A")]);
        assert_eq!(rendered, "TEST:A 1 scan SEVR\n");
    }

    #[test]
    fn test_no_archive_no_line() {
        let mut no_archive = package("Main.a", "TEST:A");
        no_archive.archive = None;
        assert_eq!(save_archive_to_string(&[no_archive]), "");
    }
}
