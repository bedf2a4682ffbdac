//! Identity data file: the record format consumed by the agent-side keytab
//! distribution step.
//!
//! One record per (host, service, component, principal, keytab). Column
//! order and the "true"/"false" encoding of the cachable flag are part of
//! the downstream contract and must not change.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// File name used inside an operation's data directory.
pub const DATA_FILE_NAME: &str = "identity.dat";

const COLUMNS: [&str; 11] = [
    "hostname",
    "service",
    "component",
    "principal",
    "principal_type",
    "keytab_file_path",
    "keytab_file_owner_name",
    "keytab_file_owner_access",
    "keytab_file_group_name",
    "keytab_file_group_access",
    "keytab_file_is_cachable",
];

/// One identity data file record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRecord {
    pub hostname: String,
    pub service_name: String,
    pub component_name: String,
    pub principal: String,
    /// "user" or "service".
    pub principal_type: String,
    pub keytab_file_path: String,
    pub keytab_owner_name: String,
    pub keytab_owner_access: String,
    pub keytab_group_name: String,
    pub keytab_group_access: String,
    pub cachable: bool,
}

/// Writes identity records as a header line plus one CSV record each.
pub struct IdentityDataFileWriter {
    writer: BufWriter<File>,
    records_written: usize,
}

impl IdentityDataFileWriter {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", COLUMNS.join(","))?;
        Ok(Self {
            writer,
            records_written: 0,
        })
    }

    pub fn write_record(&mut self, record: &IdentityRecord) -> std::io::Result<()> {
        let fields = [
            record.hostname.as_str(),
            record.service_name.as_str(),
            record.component_name.as_str(),
            record.principal.as_str(),
            record.principal_type.as_str(),
            record.keytab_file_path.as_str(),
            record.keytab_owner_name.as_str(),
            record.keytab_owner_access.as_str(),
            record.keytab_group_name.as_str(),
            record.keytab_group_access.as_str(),
            if record.cachable { "true" } else { "false" },
        ];
        writeln!(self.writer, "{}", fields.join(","))?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn finish(mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Reads identity records written by [`IdentityDataFileWriter`].
pub struct IdentityDataFileReader;

impl IdentityDataFileReader {
    pub fn read(path: impl AsRef<Path>) -> std::io::Result<Vec<IdentityRecord>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if index == 0 || line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != COLUMNS.len() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "identity data record has {} fields, expected {}",
                        fields.len(),
                        COLUMNS.len()
                    ),
                ));
            }
            records.push(IdentityRecord {
                hostname: fields[0].to_string(),
                service_name: fields[1].to_string(),
                component_name: fields[2].to_string(),
                principal: fields[3].to_string(),
                principal_type: fields[4].to_string(),
                keytab_file_path: fields[5].to_string(),
                keytab_owner_name: fields[6].to_string(),
                keytab_owner_access: fields[7].to_string(),
                keytab_group_name: fields[8].to_string(),
                keytab_group_access: fields[9].to_string(),
                cachable: fields[10].eq_ignore_ascii_case("true"),
            });
        }

        Ok(records)
    }
}
