// crates/tmcdb-rs/src/generate.rs

//! One pure pass from a parsed project to rendered outputs: walk the
//! annotated symbols, build record packages, validate, and render. Local
//! failures are collected per chain so the remaining chains still emit;
//! `allow_errors` demotes them to warnings.

use std::collections::BTreeMap;

use log::{error, warn};

use crate::builder;
use crate::chain::chains_from_symbol;
use crate::error::TmcDbError;
use crate::linter::{lint_packages, DbdFile, LintMessage, Severity};
use crate::record::{RecordPackage, MAX_RECORD_LENGTH};
use crate::resolver::TmcProject;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Keep going and demote non-fatal errors to warnings.
    pub allow_errors: bool,
    /// Maximum record-name length.
    pub max_record_length: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            allow_errors: false,
            max_record_length: MAX_RECORD_LENGTH,
        }
    }
}

/// Record packages plus every local error encountered while building
/// them.
#[derive(Debug, Default)]
pub struct BuildResult {
    pub packages: Vec<RecordPackage>,
    pub errors: Vec<TmcDbError>,
}

/// Build every record package in the project.
///
/// Fatal errors abort immediately. Local errors (malformed pragmas,
/// unresolved or unsupported types, invalid chains, duplicate names) are
/// collected; unless `allow_errors` is set, the first of them is returned
/// as the overall failure after the full pass.
pub fn build_record_packages(
    project: &TmcProject,
    options: &BuildOptions,
) -> Result<BuildResult, TmcDbError> {
    let mut result = BuildResult::default();

    for symbol in project.annotated_symbols() {
        for chain in chains_from_symbol(project, symbol) {
            let chain = match chain {
                Ok(chain) => chain,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!("Skipping chain from {}: {err}", symbol.name);
                    result.errors.push(err);
                    continue;
                }
            };

            for key in &chain.config.unknown_keys {
                warn!(
                    "Ignoring unrecognized pragma key {key:?} in chain {}",
                    chain.tcname
                );
            }

            match RecordPackage::from_chain(&chain, options.max_record_length) {
                Ok(package) => result.packages.push(package),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!("Skipping record for {}: {err}", chain.tcname);
                    result.errors.push(err);
                }
            }
        }
    }

    result
        .packages
        .sort_by(|a, b| a.tcname.cmp(&b.tcname).then_with(|| a.pvname.cmp(&b.pvname)));

    check_duplicates(&mut result);

    if !options.allow_errors {
        if let Some(err) = result.errors.first() {
            return Err(err.clone());
        }
    }
    Ok(result)
}

/// Two chains must never produce the same record name.
fn check_duplicates(result: &mut BuildResult) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for package in &result.packages {
        for record in &package.records {
            *counts.entry(record.pvname.as_str()).or_default() += 1;
        }
    }
    let duplicates: Vec<TmcDbError> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(pvname, count)| {
            error!("Record name {pvname} generated {count} times");
            TmcDbError::DuplicateRecord {
                pvname: pvname.to_string(),
            }
        })
        .collect();
    result.errors.extend(duplicates);
}

/// Lint the packages against a record-definition file. Packages whose
/// records carry error-severity findings are dropped unless `allow_errors`
/// is set; the findings are returned either way.
pub fn lint_and_filter(
    dbd: &DbdFile,
    packages: Vec<RecordPackage>,
    options: &BuildOptions,
) -> (Vec<RecordPackage>, Vec<LintMessage>) {
    let messages = lint_packages(dbd, &packages);
    for message in &messages {
        match message.severity {
            Severity::Error => error!("[{}] {}", message.location, message.message),
            Severity::Warning => warn!("[{}] {}", message.location, message.message),
        }
    }
    if options.allow_errors {
        return (packages, messages);
    }

    let failed: Vec<String> = messages
        .iter()
        .filter(|message| message.severity == Severity::Error)
        .map(|message| {
            // Locations may carry a trailing `.FIELD`; keep the record name.
            message
                .location
                .split('.')
                .next()
                .unwrap_or(&message.location)
                .to_string()
        })
        .collect();

    let kept = packages
        .into_iter()
        .filter(|package| {
            package
                .records
                .iter()
                .all(|record| !failed.contains(&record.pvname))
        })
        .collect();
    (kept, messages)
}

/// Everything one invocation produces.
#[derive(Debug)]
pub struct GeneratedDatabase {
    pub packages: Vec<RecordPackage>,
    pub errors: Vec<TmcDbError>,
    pub lint: Vec<LintMessage>,
    /// The record-database text.
    pub database: String,
    /// The companion archive-descriptor text.
    pub archive: String,
}

/// Full pipeline: build, optionally lint, and render both output texts.
pub fn generate(
    project: &TmcProject,
    dbd: Option<&DbdFile>,
    options: &BuildOptions,
) -> Result<GeneratedDatabase, TmcDbError> {
    let BuildResult { packages, errors } = build_record_packages(project, options)?;

    let (packages, lint) = match dbd {
        Some(dbd) => {
            let (packages, lint) = lint_and_filter(dbd, packages, options);
            if !options.allow_errors {
                if let Some(message) = lint
                    .iter()
                    .find(|message| message.severity == Severity::Error)
                {
                    return Err(TmcDbError::Lint {
                        record: message.location.clone(),
                        detail: message.message.clone(),
                    });
                }
            }
            (packages, lint)
        }
        None => (packages, Vec::new()),
    };

    if !errors.is_empty() {
        warn!("Generated with {} non-fatal error(s)", errors.len());
    }

    Ok(GeneratedDatabase {
        database: builder::save_database_to_string(&packages),
        archive: builder::save_archive_to_string(&packages),
        packages,
        errors,
        lint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"
    <TcModuleClass>
      <Module>
        <Name>PlcTask</Name>
        <DataArea>
          <Symbol>
            <Name>Main.first</Name>
            <BitSize>64</BitSize>
            <BitOffs>0</BitOffs>
            <BaseType>LREAL</BaseType>
            <Properties>
              <Property><Name>pytmc</Name><Value>pv: TEST:FIRST; io: i</Value></Property>
            </Properties>
          </Symbol>
          <Symbol>
            <Name>Main.second</Name>
            <BitSize>32</BitSize>
            <BitOffs>64</BitOffs>
            <BaseType>DINT</BaseType>
            <Properties>
              <Property><Name>pytmc</Name><Value>pv: TEST:SECOND; io: io</Value></Property>
            </Properties>
          </Symbol>
        </DataArea>
      </Module>
    </TcModuleClass>
    "#;

    #[test]
    fn test_build_whole_project() {
        let project = TmcProject::parse(PROJECT).unwrap();
        let result = build_record_packages(&project, &BuildOptions::default()).unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(result.packages.len(), 2);
        // Input-only symbol: one record. Bidirectional: two.
        assert_eq!(result.packages[0].records.len(), 1);
        assert_eq!(result.packages[1].records.len(), 2);
    }

    #[test]
    fn test_duplicate_names_fail() {
        // Both symbols now emit an input record named TEST:FIRST.
        let xml = PROJECT.replace("pv: TEST:SECOND; io: io", "pv: TEST:FIRST; io: i");
        let project = TmcProject::parse(&xml).unwrap();

        let err = build_record_packages(&project, &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, TmcDbError::DuplicateRecord { .. }));

        let tolerant = BuildOptions {
            allow_errors: true,
            ..BuildOptions::default()
        };
        let result = build_record_packages(&project, &tolerant).unwrap();
        assert_eq!(result.packages.len(), 2);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_allow_errors_keeps_good_chains() {
        let xml = PROJECT.replace("<BaseType>DINT</BaseType>", "<BaseType>LINT</BaseType>");
        let project = TmcProject::parse(&xml).unwrap();

        assert!(matches!(
            build_record_packages(&project, &BuildOptions::default()),
            Err(TmcDbError::UnsupportedType { .. })
        ));

        let tolerant = BuildOptions {
            allow_errors: true,
            ..BuildOptions::default()
        };
        let result = build_record_packages(&project, &tolerant).unwrap();
        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            result.errors[0],
            TmcDbError::UnsupportedType { .. }
        ));
    }

    #[test]
    fn test_generate_renders_both_outputs() {
        let project = TmcProject::parse(PROJECT).unwrap();
        let generated = generate(&project, None, &BuildOptions::default()).unwrap();
        assert!(generated.database.contains("record(ai, \"TEST:FIRST\")"));
        assert!(generated.database.contains("record(longout, \"TEST:SECOND\")"));
        assert!(generated
            .database
            .contains("record(longin, \"TEST:SECOND_RBV\")"));
        assert!(generated.archive.contains("TEST:FIRST 1 scan"));
    }
}
