// crates/tmcdb-rs/src/record.rs

//! Builds concrete record definitions from merged chains.
//!
//! The record-kind choice is a decision table keyed on the leaf type
//! family, the I/O direction, and array-ness. Field policy is bit-exact:
//! defaults first, then flavor specifics, then user `field:` entries,
//! which always win.

use log::warn;

use crate::chain::SingularChain;
use crate::error::TmcDbError;
use crate::pragma::{
    ArchiveMethod, ArchiveSettings, IoDirection, UpdateMethod, UpdateRate,
};
use crate::types::{BuiltinType, EnumValue, ResolvedType};

/// Default cap on record-name length (the EPICS process-variable limit
/// typically configured on the target).
pub const MAX_RECORD_LENGTH: usize = 60;

/// The `DESC` field length limit in the record layer.
const MAX_DESC_LENGTH: usize = 40;

/// Arrays above this element count are kept out of the archiver.
const MAX_ARCHIVE_ELEMENTS: u64 = 1000;

/// Supported polled scan rates, fastest first.
const SCAN_RATES: &[(f64, &str)] = &[
    (0.1, ".1 second"),
    (0.2, ".2 second"),
    (0.5, ".5 second"),
    (1.0, "1 second"),
    (2.0, "2 second"),
    (5.0, "5 second"),
    (10.0, "10 second"),
];

/// Fixed emission priority: record-kind selectors, then conversion, then
/// alarm configuration; anything else sorts alphabetically after these.
const FIELD_ORDER: &[&str] = &[
    "DTYP", "SCAN", "INP", "OUT", "DOL", "OMSL", // selectors
    "LINR", "ESLO", "EOFF", "PREC", "EGU", // conversion
    "HIHI", "HIGH", "LOW", "LOLO", // alarm limits
    "HHSV", "HSV", "LSV", "LLSV", // alarm severities
    "DRVH", "DRVL", // control limits
    "ZNAM", "ONAM", "ZSV", "OSV", // binary states
    "FTVL", "NELM", // waveform shape
];

/// Multi-bit state value/string field pairs, in state order.
const MBB_FIELDS: &[(&str, &str)] = &[
    ("ZRVL", "ZRST"),
    ("ONVL", "ONST"),
    ("TWVL", "TWST"),
    ("THVL", "THST"),
    ("FRVL", "FRST"),
    ("FVVL", "FVST"),
    ("SXVL", "SXST"),
    ("SVVL", "SVST"),
    ("EIVL", "EIST"),
    ("NIVL", "NIST"),
    ("TEVL", "TEST"),
    ("ELVL", "ELST"),
    ("TVVL", "TVST"),
    ("TTVL", "TTST"),
    ("FTVL", "FTST"),
    ("FFVL", "FFST"),
];

/// An insertion-ordered field mapping with later-wins semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap(Vec<(String, String)>);

impl FieldMap {
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    /// Set only when the field is not already present.
    pub fn set_default(&mut self, name: &str, value: impl Into<String>) {
        if self.get(name).is_none() {
            self.0.push((name.to_string(), value.into()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.0.iter().position(|(existing, _)| existing == name)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Fields in emission order: the fixed priority table first, then the
    /// rest alphabetically. No reliance on insertion or hash order.
    pub fn sorted(&self) -> Vec<(String, String)> {
        let mut fields = self.0.clone();
        fields.sort_by(|(a, _), (b, _)| {
            let rank = |name: &str| {
                FIELD_ORDER
                    .iter()
                    .position(|known| *known == name)
                    .unwrap_or(FIELD_ORDER.len())
            };
            rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
        });
        fields
    }
}

/// A single record definition to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct EpicsRecord {
    pub pvname: String,
    pub record_type: String,
    pub direction: IoDirection,
    pub fields: FieldMap,
    pub autosave_pass0: Vec<String>,
    pub autosave_pass1: Vec<String>,
}

/// Archiver selection for one package.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveDescriptor {
    pub seconds: f64,
    pub method: ArchiveMethod,
    /// Archived fields, sorted; always contains `VAL`.
    pub fields: Vec<String>,
}

/// The output unit for one chain: one or two records plus archive
/// metadata.
#[derive(Debug, Clone)]
pub struct RecordPackage {
    pub tcname: String,
    pub pvname: String,
    pub io: IoDirection,
    pub records: Vec<EpicsRecord>,
    pub archive: Option<ArchiveDescriptor>,
}

/// Leaf type families with a record representation.
#[derive(Debug, Clone, PartialEq)]
enum Flavor {
    Binary,
    Integer,
    Float,
    Enum(Vec<EnumValue>),
    Str { length: u32 },
    Waveform { element: BuiltinType, count: u64 },
}

impl Flavor {
    fn input_rtyp(&self) -> &'static str {
        match self {
            Flavor::Binary => "bi",
            Flavor::Integer => "longin",
            Flavor::Float => "ai",
            Flavor::Enum(_) => "mbbi",
            Flavor::Str { .. } | Flavor::Waveform { .. } => "waveform",
        }
    }

    fn output_rtyp(&self) -> &'static str {
        match self {
            Flavor::Binary => "bo",
            Flavor::Integer => "longout",
            Flavor::Float => "ao",
            Flavor::Enum(_) => "mbbo",
            Flavor::Str { .. } | Flavor::Waveform { .. } => "waveform",
        }
    }

    /// Base data-transport type; waveforms append an ArrayIn/ArrayOut
    /// direction suffix at record-build time.
    fn dtyp(&self) -> &'static str {
        match self {
            Flavor::Binary | Flavor::Integer | Flavor::Enum(_) => "asynInt32",
            Flavor::Float => "asynFloat64",
            Flavor::Str { .. } => "asynInt8",
            Flavor::Waveform { element, .. } => {
                waveform_dtyp(element).expect("classified waveform elements have transports")
            }
        }
    }

    fn is_waveform(&self) -> bool {
        matches!(self, Flavor::Str { .. } | Flavor::Waveform { .. })
    }
}

fn waveform_dtyp(element: &BuiltinType) -> Option<&'static str> {
    match element {
        BuiltinType::Bool | BuiltinType::Byte | BuiltinType::Sint | BuiltinType::Usint => {
            Some("asynInt8")
        }
        BuiltinType::Word | BuiltinType::Int | BuiltinType::Uint => Some("asynInt16"),
        BuiltinType::Dword | BuiltinType::Dint | BuiltinType::Udint => Some("asynInt32"),
        BuiltinType::Real => Some("asynFloat32"),
        BuiltinType::Lreal => Some("asynFloat64"),
        _ => None,
    }
}

fn waveform_ftvl(element: &BuiltinType) -> Option<&'static str> {
    match element {
        BuiltinType::Bool | BuiltinType::Byte | BuiltinType::Sint | BuiltinType::Usint => {
            Some("CHAR")
        }
        BuiltinType::Word | BuiltinType::Int | BuiltinType::Uint => Some("SHORT"),
        BuiltinType::Dword | BuiltinType::Dint | BuiltinType::Udint => Some("LONG"),
        BuiltinType::Real => Some("FLOAT"),
        BuiltinType::Lreal => Some("DOUBLE"),
        _ => None,
    }
}

/// Classify a chain's leaf into its record flavor.
fn classify(chain: &SingularChain<'_>) -> Result<Flavor, TmcDbError> {
    let unsupported = |type_name: &str| TmcDbError::UnsupportedType {
        tcname: chain.tcname.clone(),
        type_name: type_name.to_string(),
    };

    let builtin = match &chain.leaf_type {
        ResolvedType::Data(data_type) if data_type.is_enum() => {
            return Ok(Flavor::Enum(data_type.enum_values.clone()))
        }
        ResolvedType::Data(data_type) => {
            // Composites without annotated members never reach the builder.
            return Err(unsupported(&data_type.name));
        }
        ResolvedType::Builtin(builtin) => builtin,
    };

    if let BuiltinType::String(length) = builtin {
        return Ok(Flavor::Str { length: *length });
    }

    if let Some(array) = &chain.leaf_array {
        return match waveform_dtyp(builtin) {
            Some(_) => Ok(Flavor::Waveform {
                element: builtin.clone(),
                count: array.element_count(),
            }),
            None => Err(unsupported(builtin.name())),
        };
    }

    let scaled = chain.config.scale.is_some() || chain.config.offset.is_some();
    match builtin {
        BuiltinType::Bool => Ok(Flavor::Binary),
        BuiltinType::Real | BuiltinType::Lreal => Ok(Flavor::Float),
        BuiltinType::Byte
        | BuiltinType::Sint
        | BuiltinType::Usint
        | BuiltinType::Word
        | BuiltinType::Int
        | BuiltinType::Uint
        | BuiltinType::Dword
        | BuiltinType::Dint
        | BuiltinType::Udint => {
            // Integer records cannot apply a linear transform; promote.
            if scaled {
                Ok(Flavor::Float)
            } else {
                Ok(Flavor::Integer)
            }
        }
        BuiltinType::Lword | BuiltinType::Lint | BuiltinType::Ulint => {
            Err(unsupported(builtin.name()))
        }
        BuiltinType::String(_) => unreachable!("handled above"),
        BuiltinType::Unsupported(name) => Err(unsupported(name)),
    }
}

/// Format a float the shortest way, with integral values as integers.
pub fn format_seconds(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Map an update directive to a `SCAN` value. Change notification becomes
/// interrupt scanning; polled periods round up to the next slower
/// supported rate, with everything past 10 seconds left passive.
fn scan_value(update: &UpdateRate) -> String {
    if update.method == UpdateMethod::Notify {
        return "I/O Intr".to_string();
    }
    for (period, name) in SCAN_RATES {
        if update.seconds <= period + 1e-9 {
            return (*name).to_string();
        }
    }
    "Passive".to_string()
}

fn update_options(update: &UpdateRate) -> String {
    match update.method {
        UpdateMethod::Poll => {
            if update.frequency.fract() == 0.0 {
                format!("POLL_RATE={}/", update.frequency as i64)
            } else {
                let rate = format!("{:.2}", update.frequency);
                format!("POLL_RATE={}/", rate.trim_end_matches('0'))
            }
        }
        UpdateMethod::Notify => {
            format!("TS_MS={}/", (1000.0 * update.seconds).round() as i64)
        }
    }
}

fn asyn_port(ads_port: u16, tcname: &str, options: &str) -> String {
    format!("@asyn($(PORT),0,1)ADSPORT={ads_port}/{options}{tcname}")
}

/// Middle-ellipsis truncation for descriptions that exceed the field
/// length.
fn truncate_middle(text: &str, max_length: usize) -> String {
    if text.len() <= max_length {
        return text.to_string();
    }
    let tail = max_length / 2 - 3;
    let head = max_length - tail - 3;
    format!("{}...{}", &text[..head], &text[text.len() - tail..])
}

/// Default pass-0 autosave fields for one record, in emission order.
fn autosave_defaults(flavor: &Flavor, direction: IoDirection) -> Vec<String> {
    let mut fields: Vec<&str> = match direction {
        IoDirection::Input => vec!["DESC", "DISS", "UDFS"],
        IoDirection::Output => vec!["DESC", "DISS", "UDFS", "VAL"],
    };

    match flavor {
        Flavor::Binary => {
            fields.extend(["ZSV", "OSV"]);
            if direction == IoDirection::Output {
                fields.push("COSV");
            }
        }
        Flavor::Integer | Flavor::Float => {
            if matches!(flavor, Flavor::Float) {
                fields.push("PREC");
            }
            fields.extend(["HHSV", "HSV", "LLSV", "LSV"]);
            if direction == IoDirection::Output {
                fields.extend(["DRVH", "DRVL"]);
            }
            fields.extend(["HIHI", "LOLO", "HIGH", "LOW"]);
        }
        Flavor::Enum(_) => {
            fields.extend([
                "ZRSV", "ONSV", "TWSV", "THSV", "FRSV", "FVSV", "SXSV", "SVSV", "EISV",
                "NISV", "TESV", "ELSV", "TVSV", "TTSV", "FTSV", "FFSV", "UNSV",
            ]);
            if direction == IoDirection::Output {
                fields.push("COSV");
            }
        }
        Flavor::Str { .. } | Flavor::Waveform { .. } => {}
    }
    fields.push("SIMS");
    fields.into_iter().map(str::to_string).collect()
}

/// Fields that only exist on output records of a given flavor; they are
/// dropped from `field:` entries applied to the input side, and vice
/// versa.
fn output_only_fields(flavor: &Flavor) -> &'static [&'static str] {
    match flavor {
        Flavor::Binary => &[
            "DOL", "HIGH", "IVOA", "IVOV", "OMSL", "ORBV", "OUT", "RBV", "RPVT", "WDPT",
        ],
        Flavor::Integer => &["DOL", "DRVH", "DRVL", "IVOA", "IVOV", "OMSL"],
        Flavor::Float => &[
            "DOL", "DRVH", "DRVL", "IVOA", "IVOV", "OIF", "OMOD", "OMSL", "ORBV", "OROC",
            "OVAL", "PVAL", "RBV",
        ],
        Flavor::Enum(_) => &["DOL", "IVOA", "IVOV", "OMSL", "ORBV", "RBV"],
        Flavor::Str { .. } | Flavor::Waveform { .. } => &["DOL", "IVOA", "IVOV", "OMSL"],
    }
}

fn input_only_fields(flavor: &Flavor) -> &'static [&'static str] {
    match flavor {
        Flavor::Binary => &["SVAL"],
        Flavor::Integer | Flavor::Enum(_) => &["AFTC", "AFVL", "SVAL"],
        Flavor::Float => &["AFTC", "AFVL", "SMOO", "SVAL"],
        Flavor::Str { .. } | Flavor::Waveform { .. } => &["SVAL"],
    }
}

/// Everything needed while assembling one package.
struct Builder<'c, 'a> {
    chain: &'c SingularChain<'a>,
    flavor: Flavor,
    pvname: String,
}

impl<'c, 'a> Builder<'c, 'a> {
    fn substitute(&self, value: &str) -> String {
        value.replace(self.chain.config.macro_character, "$")
    }

    fn nelm(&self) -> u64 {
        match &self.flavor {
            Flavor::Str { length } => (*length).into(),
            Flavor::Waveform { count, .. } => *count,
            _ => 1,
        }
    }

    /// Resolve the effective autosave lists for one direction.
    fn autosave(&self, direction: IoDirection) -> (Vec<String>, Vec<String>) {
        let autosave = &self.chain.config.autosave;
        let mut pass0 = autosave_defaults(&self.flavor, direction);
        let mut pass1 = Vec::new();

        if let Some(fields) = &autosave.pass0 {
            pass0 = fields.clone();
        }
        if let Some(fields) = &autosave.pass1 {
            pass1 = fields.clone();
        }
        let (dir_pass0, dir_pass1) = match direction {
            IoDirection::Input => (&autosave.input_pass0, &autosave.input_pass1),
            IoDirection::Output => (&autosave.output_pass0, &autosave.output_pass1),
        };
        if let Some(fields) = dir_pass0 {
            pass0 = fields.clone();
        }
        if let Some(fields) = dir_pass1 {
            pass1 = fields.clone();
        }
        (pass0, pass1)
    }

    fn apply_flavor_defaults(&self, fields: &mut FieldMap) {
        match &self.flavor {
            Flavor::Binary => {
                fields.set_default("ZNAM", "FALSE");
                fields.set_default("ONAM", "TRUE");
            }
            Flavor::Integer => {}
            Flavor::Float => {
                fields.set_default("PREC", "3");
            }
            Flavor::Enum(values) => {
                let mut states = values.clone();
                states.sort_by_key(|state| state.value);
                for ((value_field, string_field), state) in MBB_FIELDS.iter().copied().zip(states) {
                    fields.set_default(value_field, state.value.to_string());
                    fields.set_default(string_field, state.text.clone());
                }
            }
            Flavor::Str { .. } => {
                fields.set_default("FTVL", "CHAR");
                fields.set_default("APST", "On Change");
                fields.set_default("MPST", "On Change");
            }
            Flavor::Waveform { element, .. } => {
                if let Some(ftvl) = waveform_ftvl(element) {
                    fields.set_default("FTVL", ftvl);
                }
                fields.set_default("APST", "On Change");
                fields.set_default("MPST", "On Change");
            }
        }
    }

    fn apply_scaling(&self, fields: &mut FieldMap) {
        if self.chain.config.scale.is_none() && self.chain.config.offset.is_none() {
            return;
        }
        let scale = self.chain.config.scale.as_deref().unwrap_or("1.0");
        let offset = self.chain.config.offset.as_deref().unwrap_or("0.0");
        // With LINR=SLOPE the record applies VAL = RVAL * ESLO + EOFF.
        fields.set("LINR", "SLOPE");
        fields.set("ESLO", scale);
        fields.set("EOFF", offset);
    }

    /// Copy user `field:` entries, skipping those that do not apply to the
    /// record's direction.
    fn apply_user_fields(&self, fields: &mut FieldMap, direction: IoDirection) {
        let skip: &[&str] = match direction {
            IoDirection::Input => output_only_fields(&self.flavor),
            IoDirection::Output => input_only_fields(&self.flavor),
        };
        for (name, value) in &self.chain.config.fields {
            if !skip.contains(&name.as_str()) {
                fields.set(name, self.substitute(value));
            }
        }
    }

    fn apply_description(&self, fields: &mut FieldMap) {
        let desc = match fields.get("DESC") {
            Some(desc) => desc.to_string(),
            None => self.chain.tcname.clone(),
        };
        fields.set("DESC", truncate_middle(&desc, MAX_DESC_LENGTH));
    }

    fn link_fields(&self) -> Option<[(&'static str, String); 3]> {
        let link = self.chain.config.link.as_deref()?;
        Some([
            ("OMSL", "closed_loop".to_string()),
            ("DOL", format!("{} CP MS", self.substitute(link))),
            ("SCAN", ".5 second".to_string()),
        ])
    }

    fn build_input(&self, pvname: String) -> EpicsRecord {
        let config = &self.chain.config;
        let mut fields = FieldMap::default();
        fields.set("DTYP", self.flavor.dtyp().to_string() + self.waveform_suffix("ArrayIn"));
        fields.set("SCAN", scan_value(&config.update));
        fields.set(
            "INP",
            asyn_port(
                self.chain.ads_port,
                &self.chain.tcname,
                &update_options(&config.update),
            ) + "?",
        );
        if self.flavor.is_waveform() {
            fields.set("NELM", self.nelm().to_string());
        }
        fields.set("TSE", "-2");
        fields.set("PINI", "1");
        self.apply_flavor_defaults(&mut fields);
        self.apply_scaling(&mut fields);
        self.apply_user_fields(&mut fields, IoDirection::Input);
        self.apply_description(&mut fields);
        // Read-only from external clients, always.
        fields.set("ASG", "NO_WRITE");

        let (autosave_pass0, autosave_pass1) = self.autosave(IoDirection::Input);
        EpicsRecord {
            pvname,
            record_type: self.flavor.input_rtyp().to_string(),
            direction: IoDirection::Input,
            fields,
            autosave_pass0,
            autosave_pass1,
        }
    }

    fn build_output(&self, pvname: String) -> EpicsRecord {
        let config = &self.chain.config;
        let mut fields = FieldMap::default();
        fields.set("DTYP", self.flavor.dtyp().to_string() + self.waveform_suffix("ArrayOut"));
        fields.set(
            "OUT",
            asyn_port(self.chain.ads_port, &self.chain.tcname, "") + "=",
        );
        if self.flavor.is_waveform() {
            fields.set("NELM", self.nelm().to_string());
        }
        // No alarm before the record has processed.
        fields.set("UDFS", "0");
        self.apply_flavor_defaults(&mut fields);
        self.apply_scaling(&mut fields);

        // Forward another record's value, unless a string needs the
        // auxiliary link record instead.
        if !matches!(self.flavor, Flavor::Str { .. }) {
            if let Some(link_fields) = self.link_fields() {
                for (name, value) in link_fields {
                    fields.set(name, value);
                }
            }
        }

        self.apply_user_fields(&mut fields, IoDirection::Output);
        self.apply_description(&mut fields);

        if self.flavor.is_waveform() {
            // Waveform records only have INP fields.
            if let Some(out) = fields.remove("OUT") {
                fields.set("INP", out);
            }
        }

        let (autosave_pass0, autosave_pass1) = self.autosave(IoDirection::Output);
        if !autosave_pass0.is_empty() {
            fields.set_default("PINI", "YES");
        }

        EpicsRecord {
            pvname,
            record_type: self.flavor.output_rtyp().to_string(),
            direction: IoDirection::Output,
            fields,
            autosave_pass0,
            autosave_pass1,
        }
    }

    /// An auxiliary `lso` record to push linked string values into the
    /// controller, since waveform outputs cannot carry `DOL`.
    fn build_string_link(&self) -> EpicsRecord {
        let mut fields = FieldMap::default();
        fields.set("SIZV", self.nelm().to_string());
        if let Some(link_fields) = self.link_fields() {
            for (name, value) in link_fields {
                fields.set(name, value);
            }
        }
        fields.set("OUT", format!("{} PP MS", self.pvname));
        fields.set(
            "DESC",
            truncate_middle(
                &format!("Aux link record for {}", self.chain.tcname),
                MAX_DESC_LENGTH,
            ),
        );

        EpicsRecord {
            pvname: format!("{}:LSO", self.pvname),
            record_type: "lso".to_string(),
            direction: IoDirection::Output,
            fields,
            autosave_pass0: vec!["DESC".into(), "DISS".into(), "UDFS".into(), "VAL".into(), "SIMS".into()],
            autosave_pass1: Vec::new(),
        }
    }

    fn waveform_suffix<'s>(&self, suffix: &'s str) -> &'s str {
        if self.flavor.is_waveform() {
            suffix
        } else {
            ""
        }
    }

    fn archive(&self) -> Option<ArchiveDescriptor> {
        let config = &self.chain.config;
        let mut settings = config.archive.clone()?;

        if let Flavor::Waveform { count, .. } = &self.flavor {
            if *count > MAX_ARCHIVE_ELEMENTS {
                warn!(
                    "Not archiving {} ({} elements exceeds the {MAX_ARCHIVE_ELEMENTS} limit)",
                    self.chain.tcname, count
                );
                return None;
            }
        }

        // Change-notified data defaults to monitor archiving at the update
        // period; explicit settings always win.
        if !config.archive_explicit && config.update.method == UpdateMethod::Notify {
            settings = ArchiveSettings {
                seconds: config.update.seconds,
                frequency: config.update.frequency,
                method: ArchiveMethod::Monitor,
            };
        }

        // Never archive faster than the data updates.
        if settings.seconds < config.update.seconds {
            settings.seconds = config.update.seconds;
        }

        let mut fields: Vec<String> = vec!["VAL".to_string()];
        for field in &config.archive_fields {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields.sort();

        Some(ArchiveDescriptor {
            seconds: settings.seconds,
            method: settings.method,
            fields,
        })
    }
}

impl RecordPackage {
    /// Build the record package for one merged chain.
    pub fn from_chain(
        chain: &SingularChain<'_>,
        max_record_length: usize,
    ) -> Result<RecordPackage, TmcDbError> {
        let flavor = classify(chain)?;
        let config = &chain.config;
        let pvname = chain.pvname.replace(config.macro_character, "$");

        let builder = Builder {
            chain,
            flavor,
            pvname: pvname.clone(),
        };

        let mut records = Vec::new();
        match config.io {
            IoDirection::Input => {
                records.push(builder.build_input(pvname.clone()));
            }
            IoDirection::Output => {
                records.push(builder.build_output(pvname.clone()));
                records.push(builder.build_input(format!("{pvname}_RBV")));
            }
        }
        if matches!(builder.flavor, Flavor::Str { .. })
            && config.io == IoDirection::Output
            && config.link.is_some()
        {
            records.push(builder.build_string_link());
        }

        // The explicit kind override is authoritative for the primary
        // record; a disagreement with the inferred kind is worth a warning.
        if let Some(override_kind) = &config.type_override {
            let primary = &mut records[0];
            if *override_kind != primary.record_type {
                warn!(
                    "Chain {}: explicit record kind {override_kind:?} overrides inferred {:?}",
                    chain.tcname, primary.record_type
                );
            }
            primary.record_type = override_kind.clone();
        }

        for record in &records {
            if record.pvname.len() > max_record_length {
                return Err(TmcDbError::InvalidChain {
                    tcname: chain.tcname.clone(),
                    detail: format!(
                        "record name {} exceeds the maximum length {max_record_length}",
                        record.pvname
                    ),
                });
            }
        }

        let archive = builder.archive();
        Ok(RecordPackage {
            tcname: chain.tcname.clone(),
            pvname,
            io: config.io,
            records,
            archive,
        })
    }
}
