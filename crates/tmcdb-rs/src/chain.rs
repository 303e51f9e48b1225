// crates/tmcdb-rs/src/chain.rs

//! Chain enumeration and configuration merging.
//!
//! A chain is one root→leaf path through the type graph in which every
//! level carries a non-empty pragma. Each level may declare several `pv`
//! configurations and arrays of composites unroll into per-index levels,
//! so one path can produce many chains; [`chains_from_symbol`] yields the
//! full cross-product lazily, one merged [`SingularChain`] at a time.

use std::collections::VecDeque;

use log::debug;

use crate::error::TmcDbError;
use crate::pragma::{
    self, ArchiveSettings, IoDirection, UpdateRate,
};
use crate::resolver::{TmcProject, TypeRegistry};
use crate::types::{ArrayInfo, ResolvedType, Symbol};

/// Fields saved by the restore machinery, split by pass and direction.
/// `None` keeps the record family's defaults; an explicit list replaces
/// them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutosaveSpec {
    pub pass0: Option<Vec<String>>,
    pub pass1: Option<Vec<String>>,
    pub input_pass0: Option<Vec<String>>,
    pub input_pass1: Option<Vec<String>>,
    pub output_pass0: Option<Vec<String>>,
    pub output_pass1: Option<Vec<String>>,
}

/// The result of merging every level of a chain into one concrete
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedConfig {
    pub io: IoDirection,
    /// Explicit `field:` entries, later levels overriding earlier ones.
    pub fields: Vec<(String, String)>,
    pub update: UpdateRate,
    /// `None` when archiving was disabled with `archive: no`.
    pub archive: Option<ArchiveSettings>,
    /// Whether an `archive:` key appeared anywhere in the chain.
    pub archive_explicit: bool,
    pub archive_fields: Vec<String>,
    pub autosave: AutosaveSpec,
    pub link: Option<String>,
    pub scale: Option<String>,
    pub offset: Option<String>,
    pub macro_character: char,
    pub type_override: Option<String>,
    pub str_format: Option<String>,
    /// Unrecognized keys, surfaced as non-fatal diagnostics.
    pub unknown_keys: Vec<String>,
}

/// A single piece of data to surface: the dotted source path, the joined
/// PV name, the merged configuration, and the leaf type information.
#[derive(Debug, Clone)]
pub struct SingularChain<'a> {
    pub tcname: String,
    pub pvname: String,
    pub config: MergedConfig,
    pub leaf_type: ResolvedType<'a>,
    /// Array bounds of the leaf, when it was not unrolled.
    pub leaf_array: Option<ArrayInfo>,
    pub ads_port: u16,
}

/// One level of a root→leaf path before configuration expansion.
#[derive(Debug, Clone)]
struct PathLevel<'a> {
    name: String,
    pragma: String,
    resolved: ResolvedType<'a>,
    array_info: Option<&'a ArrayInfo>,
    context: String,
}

impl PathLevel<'_> {
    /// Whether configurations at this level unroll into array elements.
    fn expands(&self) -> bool {
        self.array_info.is_some() && (self.resolved.is_complex() || self.resolved.is_enum())
    }
}

/// Pull-based enumeration of annotated root→leaf paths. A depth-first
/// stack holds pending levels; an item is only descended through when its
/// pragma is non-empty.
struct PathIter<'a> {
    registry: &'a TypeRegistry,
    path: Vec<PathLevel<'a>>,
    stack: Vec<(usize, Result<PathLevel<'a>, TmcDbError>)>,
}

impl<'a> PathIter<'a> {
    fn new(registry: &'a TypeRegistry, symbol: &'a Symbol) -> PathIter<'a> {
        let mut stack = Vec::new();
        if let Some(pragma) = symbol.pragma.as_deref().filter(|p| !p.trim().is_empty()) {
            let root = match registry.resolve(&symbol.type_ref, &symbol.xml_path) {
                Ok(resolved) => Ok(PathLevel {
                    name: symbol.name.clone(),
                    pragma: pragma.to_string(),
                    resolved,
                    array_info: symbol.array_info.as_ref(),
                    context: symbol.xml_path.clone(),
                }),
                Err(error) => Err(error),
            };
            stack.push((0, root));
        }
        PathIter {
            registry,
            path: Vec::new(),
            stack,
        }
    }
}

impl<'a> Iterator for PathIter<'a> {
    type Item = Result<Vec<PathLevel<'a>>, TmcDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((depth, level)) = self.stack.pop() {
            self.path.truncate(depth);
            let level = match level {
                Ok(level) => level,
                Err(error) => return Some(Err(error)),
            };
            let composite: Option<&'a crate::types::DataType> = match &level.resolved {
                ResolvedType::Data(data_type) if !data_type.is_enum() => Some(*data_type),
                _ => None,
            };
            let context = level.context.clone();
            self.path.push(level);

            let Some(data_type) = composite else {
                // Primitive, string, enumeration, or pointer: a leaf.
                return Some(Ok(self.path.clone()));
            };

            let members = self.registry.effective_sub_items(data_type);
            // Reverse push keeps declaration order on the pop side.
            for member in members.into_iter().rev() {
                let Some(pragma) = member.pragma.as_deref().filter(|p| !p.trim().is_empty())
                else {
                    continue;
                };
                let member_context = format!("{context}/{}", member.name);
                let child = self
                    .registry
                    .resolve(&member.type_ref, &member_context)
                    .map(|resolved| PathLevel {
                        name: member.name.clone(),
                        pragma: pragma.to_string(),
                        resolved,
                        array_info: member.array_info.as_ref(),
                        context: member_context,
                    });
                self.stack.push((depth + 1, child));
            }
        }
        None
    }
}

/// One expanded configuration choice at one level: the (possibly indexed)
/// item name, the PV segment, and the remaining pragma pairs.
#[derive(Debug, Clone)]
struct LevelOption {
    name: String,
    pv: String,
    pairs: Vec<(String, String)>,
}

/// Split a parsed pragma into per-`pv` configurations.
///
/// Keys before the first `pv` are dropped (with a note) when explicit `pv`
/// keys exist; a pragma with no `pv` at all becomes a single configuration
/// with an empty segment, so that inherited segments can still name it.
fn split_by_pv(pairs: &[(String, String)], context: &str) -> Vec<(String, Vec<(String, String)>)> {
    let has_pv = pairs.iter().any(|(key, _)| key == "pv");
    if !has_pv {
        return vec![(String::new(), pairs.to_vec())];
    }

    let mut configs: Vec<(String, Vec<(String, String)>)> = Vec::new();
    for (key, value) in pairs {
        if key == "pv" {
            configs.push((value.clone(), Vec::new()));
        } else if let Some((_, config)) = configs.last_mut() {
            config.push((key.clone(), value.clone()));
        } else {
            debug!("Dropping pragma key {key:?} before the first pv ({context})");
        }
    }
    configs
}

fn take_key(pairs: &mut Vec<(String, String)>, key: &str) -> Option<String> {
    let index = pairs.iter().position(|(k, _)| k == key)?;
    Some(pairs.remove(index).1)
}

fn invalid(tcname: &str, detail: impl Into<String>) -> TmcDbError {
    TmcDbError::InvalidChain {
        tcname: tcname.to_string(),
        detail: detail.into(),
    }
}

/// Expand one level into its configuration options, unrolling composite
/// and enumeration arrays into per-index options.
fn level_options(level: &PathLevel<'_>, tcname: &str) -> Result<Vec<LevelOption>, TmcDbError> {
    let pairs = pragma::parse_pragma(&level.pragma, &level.context)?;
    let configs = split_by_pv(&pairs, &level.context);

    let mut options = Vec::new();
    for (pv, mut config_pairs) in configs {
        if !level.expands() {
            options.push(LevelOption {
                name: level.name.clone(),
                pv,
                pairs: config_pairs,
            });
            continue;
        }

        let array_info = level.array_info.expect("expanding level has array info");
        let selector = take_key(&mut config_pairs, "array").unwrap_or_default();
        let explicit_format = take_key(&mut config_pairs, "expand");

        if array_info.dims.len() > 1 && !selector.trim().is_empty() {
            return Err(invalid(
                tcname,
                "array selector on a multi-dimensional array",
            ));
        }

        // Each selected index combination becomes its own option.
        let mut combos: Vec<(String, String)> = vec![(level.name.clone(), pv.clone())];
        for (dim, bounds) in array_info.dims.iter().enumerate() {
            let indices = if dim == 0 {
                pragma::parse_array_selector(&selector, *bounds)
                    .map_err(|detail| invalid(tcname, detail))?
            } else {
                (bounds.0..=bounds.1).collect()
            };
            let max_index = indices.iter().copied().max().unwrap_or(0);
            let format = match (&explicit_format, dim) {
                (Some(format), 0) => format.clone(),
                _ => pragma::auto_expand_format(max_index),
            };

            let mut next = Vec::new();
            for (name, pv) in &combos {
                for index in &indices {
                    let suffix = pragma::expand_format(&format, *index)
                        .map_err(|detail| invalid(tcname, detail))?;
                    next.push((format!("{name}[{index}]"), format!("{pv}{suffix}")));
                }
            }
            combos = next;
        }

        for (name, pv) in combos {
            options.push(LevelOption {
                name,
                pv,
                pairs: config_pairs.clone(),
            });
        }
    }
    Ok(options)
}

const AUTOSAVE_KEYS: &[&str] = &[
    "autosave_pass0",
    "autosave_pass1",
    "autosave_input_pass0",
    "autosave_input_pass1",
    "autosave_output_pass0",
    "autosave_output_pass1",
];

fn autosave_slot<'s>(spec: &'s mut AutosaveSpec, key: &str) -> &'s mut Option<Vec<String>> {
    match key {
        "autosave_pass0" => &mut spec.pass0,
        "autosave_pass1" => &mut spec.pass1,
        "autosave_input_pass0" => &mut spec.input_pass0,
        "autosave_input_pass1" => &mut spec.input_pass1,
        "autosave_output_pass0" => &mut spec.output_pass0,
        "autosave_output_pass1" => &mut spec.output_pass1,
        _ => unreachable!("checked against AUTOSAVE_KEYS"),
    }
}

/// Set-union in first-occurrence order.
fn union_into(list: &mut Vec<String>, value: &str) {
    for field in value.split_whitespace() {
        if !list.iter().any(|existing| existing == field) {
            list.push(field.to_string());
        }
    }
}

fn union_fields(target: &mut Option<Vec<String>>, value: &str) {
    union_into(target.get_or_insert_with(Vec::new), value);
}

/// Merge the per-level configurations of one chain, in declaration order,
/// into a single concrete configuration. Returns `InvalidChain` when the
/// result has no `pv`, when `array`/`expand` keys survive to a level that
/// cannot use them, or when a normalizer rejects a value.
fn merge_levels(
    levels: &[LevelOption],
    tcname: &str,
) -> Result<(String, MergedConfig), TmcDbError> {
    let mut io_raw: Option<String> = None;
    let mut update_raw: Option<String> = None;
    let mut archive_raw: Option<String> = None;
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut archive_fields: Vec<String> = Vec::new();
    let mut autosave = AutosaveSpec::default();
    let mut link = None;
    let mut scale = None;
    let mut offset = None;
    let mut macro_character = '@';
    let mut type_override = None;
    let mut str_format = None;
    let mut unknown_keys = Vec::new();

    for level in levels {
        for (key, value) in &level.pairs {
            match key.as_str() {
                "io" => io_raw = Some(value.clone()),
                "update" => update_raw = Some(value.clone()),
                "archive" => archive_raw = Some(value.clone()),
                "field" => {
                    let (name, setting) = pragma::split_field(value);
                    match fields.iter_mut().find(|(existing, _)| *existing == name) {
                        Some((_, slot)) => *slot = setting,
                        None => fields.push((name, setting)),
                    }
                }
                "archive_fields" => union_into(&mut archive_fields, value),
                key_name if AUTOSAVE_KEYS.contains(&key_name) => {
                    union_fields(autosave_slot(&mut autosave, key_name), value);
                }
                "link" => link = Some(value.clone()),
                "scale" => scale = Some(value.clone()),
                "offset" => offset = Some(value.clone()),
                "type" => type_override = Some(value.clone()),
                "str" => str_format = Some(value.clone()),
                "macro_character" => {
                    let mut chars = value.trim().chars();
                    match (chars.next(), chars.next()) {
                        (Some(character), None) => macro_character = character,
                        _ => {
                            return Err(invalid(
                                tcname,
                                format!("macro_character must be a single character, got {value:?}"),
                            ))
                        }
                    }
                }
                "array" | "expand" => {
                    return Err(invalid(
                        tcname,
                        format!("`{key}` is only valid on an unrolled array level"),
                    ))
                }
                _ => {
                    if !unknown_keys.contains(key) {
                        unknown_keys.push(key.clone());
                    }
                }
            }
        }
    }

    let segments: Vec<&str> = levels
        .iter()
        .map(|level| level.pv.as_str())
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(invalid(tcname, "no pv key anywhere in the chain"));
    }
    let pvname = segments.join(":");
    if pvname.starts_with(':') || pvname.ends_with(':') || pvname.contains("::") {
        return Err(invalid(tcname, format!("malformed pv name {pvname:?}")));
    }

    let io = match io_raw {
        Some(raw) => pragma::normalize_io(&raw).map_err(|detail| invalid(tcname, detail))?,
        None => IoDirection::Output,
    };
    let update = match update_raw {
        Some(raw) => {
            pragma::parse_update_rate(&raw).map_err(|detail| invalid(tcname, detail))?
        }
        None => UpdateRate::default(),
    };
    let archive_explicit = archive_raw.is_some();
    let archive = match archive_raw {
        Some(raw) => pragma::parse_archive_settings(&raw)
            .map_err(|detail| invalid(tcname, detail))?,
        None => Some(ArchiveSettings::default()),
    };

    Ok((
        pvname,
        MergedConfig {
            io,
            fields,
            update,
            archive,
            archive_explicit,
            archive_fields,
            autosave,
            link,
            scale,
            offset,
            macro_character,
            type_override,
            str_format,
            unknown_keys,
        },
    ))
}

/// Expand one annotated path into all of its merged chains.
fn expand_path<'a>(
    path: &[PathLevel<'a>],
    ads_port: u16,
) -> Vec<Result<SingularChain<'a>, TmcDbError>> {
    let tcname_hint = path
        .iter()
        .map(|level| level.name.as_str())
        .collect::<Vec<_>>()
        .join(".");

    let mut per_level = Vec::with_capacity(path.len());
    for level in path {
        match level_options(level, &tcname_hint) {
            Ok(options) if options.is_empty() => return Vec::new(),
            Ok(options) => per_level.push(options),
            Err(error) => return vec![Err(error)],
        }
    }

    let Some(leaf) = path.last() else {
        return Vec::new();
    };
    let leaf_array = if leaf.expands() {
        None
    } else {
        leaf.array_info.cloned()
    };

    // Odometer over the per-level options: rightmost level varies fastest.
    let mut chains = Vec::new();
    let mut cursor = vec![0usize; per_level.len()];
    loop {
        let combination: Vec<LevelOption> = cursor
            .iter()
            .zip(&per_level)
            .map(|(&index, options)| options[index].clone())
            .collect();

        let tcname = combination
            .iter()
            .map(|option| option.name.as_str())
            .collect::<Vec<_>>()
            .join(".");
        chains.push(merge_levels(&combination, &tcname).map(|(pvname, config)| {
            SingularChain {
                tcname,
                pvname,
                config,
                leaf_type: leaf.resolved.clone(),
                leaf_array: leaf_array.clone(),
                ads_port,
            }
        }));

        let mut position = per_level.len();
        loop {
            if position == 0 {
                return chains;
            }
            position -= 1;
            cursor[position] += 1;
            if cursor[position] < per_level[position].len() {
                break;
            }
            cursor[position] = 0;
        }
    }
}

/// All chains reachable from an annotated root symbol, lazily.
pub fn chains_from_symbol<'a>(
    project: &'a TmcProject,
    symbol: &'a Symbol,
) -> impl Iterator<Item = Result<SingularChain<'a>, TmcDbError>> + 'a {
    ChainIter {
        paths: PathIter::new(&project.registry, symbol),
        ads_port: symbol.ads_port,
        pending: VecDeque::new(),
    }
}

struct ChainIter<'a> {
    paths: PathIter<'a>,
    ads_port: u16,
    pending: VecDeque<Result<SingularChain<'a>, TmcDbError>>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = Result<SingularChain<'a>, TmcDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chain) = self.pending.pop_front() {
                return Some(chain);
            }
            match self.paths.next()? {
                Ok(path) => self.pending.extend(expand_path(&path, self.ads_port)),
                Err(error) => return Some(Err(error)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pragma::UpdateMethod;
    use crate::types::BuiltinType;

    fn project(xml: &str) -> TmcProject {
        TmcProject::parse(xml).unwrap()
    }

    fn symbol_chains<'a>(
        project: &'a TmcProject,
        name: &str,
    ) -> Vec<Result<SingularChain<'a>, TmcDbError>> {
        let symbol = project
            .symbols
            .iter()
            .find(|symbol| symbol.name == name)
            .unwrap();
        chains_from_symbol(project, symbol).collect()
    }

    const COUNTER: &str = r#"
    <TcModuleClass>
      <DataTypes>
        <DataType>
          <Name>ST_Counter</Name>
          <BitSize>64</BitSize>
          <SubItem>
            <Name>value_d</Name>
            <Type>DINT</Type>
            <BitSize>32</BitSize>
            <BitOffs>0</BitOffs>
            <Properties>
              <Property><Name>pytmc</Name><Value>pv: VALUE; io: i</Value></Property>
            </Properties>
          </SubItem>
          <SubItem>
            <Name>unannotated</Name>
            <Type>DINT</Type>
            <BitSize>32</BitSize>
            <BitOffs>32</BitOffs>
          </SubItem>
        </DataType>
      </DataTypes>
      <Module>
        <Name>PlcTask</Name>
        <DataArea>
          <Symbol>
            <Name>Main.counter_b</Name>
            <BitSize>64</BitSize>
            <BitOffs>0</BitOffs>
            <BaseType>ST_Counter</BaseType>
            <Properties>
              <Property><Name>pytmc</Name><Value>pv: TEST:COUNTER_B</Value></Property>
            </Properties>
          </Symbol>
        </DataArea>
      </Module>
    </TcModuleClass>
    "#;

    #[test]
    fn test_nested_composite_chain() {
        let project = project(COUNTER);
        let chains = symbol_chains(&project, "Main.counter_b");
        assert_eq!(chains.len(), 1);
        let chain = chains[0].as_ref().unwrap();
        assert_eq!(chain.tcname, "Main.counter_b.value_d");
        assert_eq!(chain.pvname, "TEST:COUNTER_B:VALUE");
        assert_eq!(chain.config.io, IoDirection::Input);
        assert_eq!(chain.leaf_type, ResolvedType::Builtin(BuiltinType::Dint));
    }

    #[test]
    fn test_multi_pv_expansion() {
        let xml = COUNTER.replace(
            "pv: VALUE; io: i",
            "pv: VALUE; io: i; pv: VALUE2; io: o",
        );
        let project = project(&xml);
        let chains = symbol_chains(&project, "Main.counter_b");
        assert_eq!(chains.len(), 2);
        let first = chains[0].as_ref().unwrap();
        let second = chains[1].as_ref().unwrap();
        assert_eq!(first.pvname, "TEST:COUNTER_B:VALUE");
        assert_eq!(first.config.io, IoDirection::Input);
        assert_eq!(second.pvname, "TEST:COUNTER_B:VALUE2");
        assert_eq!(second.config.io, IoDirection::Output);
    }

    #[test]
    fn test_unannotated_members_are_pruned() {
        // Only `value_d` carries a pragma, so exactly one chain exists; the
        // `unannotated` member produced none.
        let project = project(COUNTER);
        let chains = symbol_chains(&project, "Main.counter_b");
        assert_eq!(chains.len(), 1);
    }

    #[test]
    fn test_chain_without_pv_is_invalid() {
        let xml = COUNTER
            .replace("pv: TEST:COUNTER_B", "io: o")
            .replace("pv: VALUE; io: i", "io: i");
        let project = project(&xml);
        let chains = symbol_chains(&project, "Main.counter_b");
        assert_eq!(chains.len(), 1);
        assert!(matches!(
            chains[0],
            Err(TmcDbError::InvalidChain { .. })
        ));
    }

    #[test]
    fn test_merge_overrides_and_unions() {
        let xml = COUNTER
            .replace(
                "pv: TEST:COUNTER_B",
                "pv: TEST:COUNTER_B; update: 2s; field: EGU counts; \
                 autosave_pass0: VAL DESC; archive_fields: SEVR",
            )
            .replace(
                "pv: VALUE; io: i",
                "pv: VALUE; io: i; update: 1s; field: EGU mm; \
                 autosave_pass0: VAL HIGH; archive_fields: DESC",
            );
        let project = project(&xml);
        let chains = symbol_chains(&project, "Main.counter_b");
        let chain = chains[0].as_ref().unwrap();

        // Later levels override scalar keys and field entries...
        assert!((chain.config.update.seconds - 1.0).abs() < 1e-9);
        assert_eq!(
            chain.config.fields,
            vec![("EGU".to_string(), "mm".to_string())]
        );
        // ...while autosave lists and archive fields are set-unions in
        // first-occurrence order.
        assert_eq!(
            chain.config.autosave.pass0.as_deref(),
            Some(&["VAL".to_string(), "DESC".to_string(), "HIGH".to_string()][..])
        );
        assert_eq!(chain.config.archive_fields, ["SEVR", "DESC"]);
    }

    #[test]
    fn test_update_notify_normalization() {
        let xml = COUNTER.replace("pv: VALUE; io: i", "pv: VALUE; io: i; update: 10Hz notify");
        let project = project(&xml);
        let chains = symbol_chains(&project, "Main.counter_b");
        let chain = chains[0].as_ref().unwrap();
        assert_eq!(chain.config.update.method, UpdateMethod::Notify);
        assert!((chain.config.update.seconds - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_misplaced_array_key_is_invalid() {
        let xml = COUNTER.replace("pv: VALUE; io: i", "pv: VALUE; io: i; array: 0..2");
        let project = project(&xml);
        let chains = symbol_chains(&project, "Main.counter_b");
        assert!(matches!(
            chains[0],
            Err(TmcDbError::InvalidChain { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_are_collected() {
        let xml = COUNTER.replace("pv: VALUE; io: i", "pv: VALUE; io: i; mystery: 1");
        let project = project(&xml);
        let chains = symbol_chains(&project, "Main.counter_b");
        let chain = chains[0].as_ref().unwrap();
        assert_eq!(chain.config.unknown_keys, ["mystery"]);
    }

    const ARRAY_OF_STRUCT: &str = r#"
    <TcModuleClass>
      <DataTypes>
        <DataType>
          <Name>DUT_X</Name>
          <BitSize>32</BitSize>
          <SubItem>
            <Name>a</Name>
            <Type>DINT</Type>
            <BitSize>32</BitSize>
            <BitOffs>0</BitOffs>
            <Properties>
              <Property><Name>pytmc</Name><Value>pv: A; io: i</Value></Property>
            </Properties>
          </SubItem>
        </DataType>
      </DataTypes>
      <Module>
        <Name>PlcTask</Name>
        <DataArea>
          <Symbol>
            <Name>Main.arr</Name>
            <BitSize>192</BitSize>
            <BitOffs>0</BitOffs>
            <BaseType>DUT_X</BaseType>
            <ArrayInfo>
              <LBound>0</LBound>
              <Elements>6</Elements>
            </ArrayInfo>
            <Properties>
              <Property><Name>pytmc</Name><Value>pv: MY:ARRAY</Value></Property>
            </Properties>
          </Symbol>
        </DataArea>
      </Module>
    </TcModuleClass>
    "#;

    #[test]
    fn test_array_of_composite_unrolls() {
        let project = project(ARRAY_OF_STRUCT);
        let chains = symbol_chains(&project, "Main.arr");
        assert_eq!(chains.len(), 6);
        let pvs: Vec<_> = chains
            .iter()
            .map(|chain| chain.as_ref().unwrap().pvname.clone())
            .collect();
        assert_eq!(pvs[0], "MY:ARRAY:00:A");
        assert_eq!(pvs[5], "MY:ARRAY:05:A");
        assert_eq!(chains[0].as_ref().unwrap().tcname, "Main.arr[0].a");
        // Unrolled levels consume the array bounds.
        assert!(chains[0].as_ref().unwrap().leaf_array.is_none());
    }

    #[test]
    fn test_array_selector_and_width() {
        let xml = ARRAY_OF_STRUCT
            .replace("<Elements>6</Elements>", "<Elements>101</Elements>")
            .replace("pv: MY:ARRAY", "pv: MY:ARRAY; array: 0..1, 99");
        let project = project(&xml);
        let chains = symbol_chains(&project, "Main.arr");
        let pvs: Vec<_> = chains
            .iter()
            .map(|chain| chain.as_ref().unwrap().pvname.clone())
            .collect();
        assert_eq!(pvs, ["MY:ARRAY:000:A", "MY:ARRAY:001:A", "MY:ARRAY:099:A"]);
    }

    #[test]
    fn test_array_of_primitive_stays_whole() {
        let xml = ARRAY_OF_STRUCT
            .replace("<BaseType>DUT_X</BaseType>", "<BaseType>INT</BaseType>")
            .replace("pv: MY:ARRAY", "pv: MY:ARRAY; io: i");
        let project = project(&xml);
        let chains = symbol_chains(&project, "Main.arr");
        assert_eq!(chains.len(), 1);
        let chain = chains[0].as_ref().unwrap();
        assert_eq!(chain.pvname, "MY:ARRAY");
        assert_eq!(chain.leaf_array.as_ref().unwrap().element_count(), 6);
    }
}
