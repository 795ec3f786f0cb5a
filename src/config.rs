use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::field::FieldId;
use crate::heap::{AddressOrdering, AggrKind, MemHeap, SortOrder};

/// Top-level configuration for a flowstat run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Number of lock shards in the group table. Default: 16.
    #[serde(default = "default_shards")]
    pub shards: usize,

    /// Number of threads reading input files. Default: 4.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Count a pair-field flow once when both directions build the same key.
    #[serde(default)]
    pub nfdump_compat: bool,

    /// How addresses are ordered when sorting. Default: legacy.
    #[serde(default)]
    pub address_ordering: AddressOrdering,

    /// Maximum number of result rows to print. 0 prints everything.
    #[serde(default)]
    pub limit: usize,

    /// Result format. Default: table.
    #[serde(default)]
    pub output: OutputFormat,

    /// Aggregation fields, in registration order.
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

/// How one field participates in aggregation.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    /// Catalog field name (e.g. "srcip", "bytes", "port").
    pub field: String,

    /// Aggregation kind. Default: auto.
    #[serde(default)]
    pub aggr: AggrKind,

    /// Sort direction. At most one field may set this.
    #[serde(default)]
    pub sort: SortOrder,

    /// IPv4 prefix length applied to address keys. 0 keeps full addresses.
    #[serde(default)]
    pub ipv4_prefix: u8,

    /// IPv6 prefix length applied to address keys. 0 keeps full addresses.
    #[serde(default)]
    pub ipv6_prefix: u8,
}

/// Result output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            shards: default_shards(),
            workers: default_workers(),
            nfdump_compat: false,
            address_ordering: AddressOrdering::default(),
            limit: 0,
            output: OutputFormat::default(),
            fields: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shards() -> usize {
    16
}

fn default_workers() -> usize {
    4
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            bail!("fields must list at least one field");
        }

        if self.shards == 0 {
            bail!("shards must be positive");
        }

        if self.workers == 0 {
            bail!("workers must be positive");
        }

        let mut seen = HashSet::new();
        let mut sorted = Vec::new();
        for f in &self.fields {
            let id = FieldId::from_name(&f.field)
                .with_context(|| format!("unknown field: {}", f.field))?;
            if !seen.insert(id) {
                bail!("field listed more than once: {}", f.field);
            }
            if f.ipv4_prefix > 32 {
                bail!(
                    "field {}: ipv4_prefix must be at most 32, got {}",
                    f.field,
                    f.ipv4_prefix
                );
            }
            if f.ipv6_prefix > 128 {
                bail!(
                    "field {}: ipv6_prefix must be at most 128, got {}",
                    f.field,
                    f.ipv6_prefix
                );
            }
            if f.sort != SortOrder::None {
                sorted.push(f.field.as_str());
            }
        }

        if sorted.len() > 1 {
            bail!("only one field may be sorted, got: {}", sorted.join(", "));
        }

        Ok(())
    }

    /// Registers every configured field and engine option on `heap`.
    pub fn apply(&self, heap: &mut MemHeap) -> Result<()> {
        for f in &self.fields {
            let id = FieldId::from_name(&f.field)
                .with_context(|| format!("unknown field: {}", f.field))?;
            heap.configure(id, f.aggr, f.sort, f.ipv4_prefix, f.ipv6_prefix)
                .with_context(|| format!("configuring field {}", f.field))?;
        }
        heap.set_nfdump_compat(self.nfdump_compat);
        heap.set_address_ordering(self.address_ordering);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn field(name: &str) -> FieldConfig {
        FieldConfig {
            field: name.to_string(),
            aggr: AggrKind::Auto,
            sort: SortOrder::None,
            ipv4_prefix: 0,
            ipv6_prefix: 0,
        }
    }

    fn valid_config() -> Config {
        Config {
            fields: vec![field("srcport"), field("bytes")],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.shards, 16);
        assert_eq!(cfg.workers, 4);
        assert!(!cfg.nfdump_compat);
        assert_eq!(cfg.address_ordering, AddressOrdering::Legacy);
        assert_eq!(cfg.limit, 0);
        assert_eq!(cfg.output, OutputFormat::Table);
    }

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
shards: 4
workers: 2
nfdump_compat: true
address_ordering: numeric
output: json
limit: 10
fields:
  - field: srcip
    ipv4_prefix: 24
    ipv6_prefix: 64
  - field: bytes
    aggr: sum
    sort: desc
  - field: pkts
"#
        )
        .expect("write config");

        let cfg = Config::load(file.path()).expect("load config");
        assert_eq!(cfg.shards, 4);
        assert_eq!(cfg.workers, 2);
        assert!(cfg.nfdump_compat);
        assert_eq!(cfg.address_ordering, AddressOrdering::Numeric);
        assert_eq!(cfg.output, OutputFormat::Json);
        assert_eq!(cfg.limit, 10);
        assert_eq!(cfg.fields.len(), 3);
        assert_eq!(cfg.fields[0].ipv4_prefix, 24);
        assert_eq!(cfg.fields[1].aggr, AggrKind::Sum);
        assert_eq!(cfg.fields[1].sort, SortOrder::Desc);
        assert_eq!(cfg.fields[2].aggr, AggrKind::Auto);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/flowstat.yaml")).unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }

    #[test]
    fn test_validation_empty_fields() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("at least one field"));
    }

    #[test]
    fn test_validation_unknown_field() {
        let cfg = Config {
            fields: vec![field("nosuchfield")],
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("unknown field: nosuchfield"));
    }

    #[test]
    fn test_validation_duplicate_field() {
        let cfg = Config {
            fields: vec![field("bytes"), field("bytes")],
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_validation_two_sorted_fields() {
        let mut cfg = valid_config();
        cfg.fields[0].sort = SortOrder::Asc;
        cfg.fields[1].sort = SortOrder::Desc;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("only one field may be sorted"));
    }

    #[test]
    fn test_validation_prefix_bounds() {
        let mut cfg = valid_config();
        cfg.fields[0].ipv4_prefix = 33;
        assert!(cfg.validate().unwrap_err().to_string().contains("ipv4_prefix"));

        let mut cfg = valid_config();
        cfg.fields[0].ipv6_prefix = 129;
        assert!(cfg.validate().unwrap_err().to_string().contains("ipv6_prefix"));
    }

    #[test]
    fn test_validation_zero_workers_and_shards() {
        let cfg = Config {
            workers: 0,
            ..valid_config()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("workers"));

        let cfg = Config {
            shards: 0,
            ..valid_config()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("shards"));
    }

    #[test]
    fn test_apply_configures_heap() {
        let mut cfg = valid_config();
        cfg.fields[1].sort = SortOrder::Desc;
        cfg.nfdump_compat = true;
        cfg.address_ordering = AddressOrdering::Numeric;

        let mut heap = MemHeap::new(cfg.shards);
        cfg.apply(&mut heap).expect("apply config");
        assert_eq!(heap.key_template()[0].field, FieldId::SRCPORT);
        assert_eq!(heap.value_template()[0].field, FieldId::DOCTETS);
        assert_eq!(heap.sort_spec().map(|s| s.field), Some(FieldId::DOCTETS));
        assert!(heap.nfdump_compat());
        assert_eq!(heap.address_ordering(), AddressOrdering::Numeric);
    }

    #[test]
    fn test_apply_rejects_unaggregatable_field() {
        let cfg = Config {
            fields: vec![FieldConfig {
                aggr: AggrKind::Key,
                ..field("username")
            }],
            ..Default::default()
        };
        let mut heap = MemHeap::new(1);
        let err = cfg.apply(&mut heap).unwrap_err();
        assert!(err.to_string().contains("configuring field username"));
    }
}
