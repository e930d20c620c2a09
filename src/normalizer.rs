// 📥 Import Normalizer - Heterogeneous JSON payloads → canonical voter records
// Two accepted shapes: legacy {administrative_metadata, voter_records} and
// the flat array format produced by the current extraction tooling.

use anyhow::{bail, Context, Result};
use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Literal used for every missing free-text field so downstream display and
/// filtering never has to deal with nulls.
pub const NOT_AVAILABLE: &str = "N/A";

/// Skip reason for records excluded before they ever reach the store.
pub const SKIP_EXCLUDED: &str = "deleted/missing name";

// ============================================================================
// WIRE FORMATS
// ============================================================================

/// Flat voter object as submitted by the extraction tooling.
/// Every field is optional on the wire; unknown keys are kept in `extra`
/// so skipped records can be exported exactly as they arrived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatVoterRecord {
    #[serde(default)]
    pub serial_no: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub voter_id: String,

    #[serde(default)]
    pub father_name: String,

    #[serde(default)]
    pub mother_name: String,

    #[serde(default)]
    pub occupation: String,

    #[serde(default)]
    pub date_of_birth: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub district: String,

    #[serde(default)]
    pub upazila: String,

    #[serde(default, rename = "union")]
    pub union_name: String,

    #[serde(default)]
    pub ward_number: String,

    #[serde(default)]
    pub voter_area: String,

    #[serde(default)]
    pub voter_area_code: String,

    /// Only legacy records carry a status; flat extractions omit it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Area block of the legacy payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdministrativeMetadata {
    #[serde(default)]
    pub district: String,

    #[serde(default)]
    pub upazila_thana: String,

    #[serde(default)]
    pub union_paurashava: String,

    #[serde(default)]
    pub ward_number: String,

    #[serde(default)]
    pub voter_area_name: String,

    #[serde(default)]
    pub voter_area_code: String,

    #[serde(default)]
    pub post_office: String,

    #[serde(default)]
    pub post_code: String,

    #[serde(default)]
    pub total_voters: i64,

    #[serde(default)]
    pub total_male_voters: i64,

    #[serde(default)]
    pub publication_date: String,
}

/// Voter row of the legacy payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyVoterRecord {
    #[serde(default)]
    pub sl_no: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub voter_id: String,

    #[serde(default)]
    pub father: String,

    #[serde(default)]
    pub mother: String,

    #[serde(default)]
    pub occupation: String,

    #[serde(default)]
    pub dob: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub status: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl LegacyVoterRecord {
    /// Map a legacy row onto the flat shape, copying area fields from the
    /// metadata block. This is the single place the two formats converge.
    pub fn into_flat(self, meta: &AdministrativeMetadata) -> FlatVoterRecord {
        FlatVoterRecord {
            serial_no: self.sl_no,
            name: self.name,
            voter_id: self.voter_id,
            father_name: self.father,
            mother_name: self.mother,
            occupation: self.occupation,
            date_of_birth: self.dob,
            address: self.address,
            district: meta.district.clone(),
            upazila: meta.upazila_thana.clone(),
            union_name: meta.union_paurashava.clone(),
            ward_number: meta.ward_number.clone(),
            voter_area: meta.voter_area_name.clone(),
            voter_area_code: meta.voter_area_code.clone(),
            status: self.status,
            extra: self.extra,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyPayload {
    pub administrative_metadata: AdministrativeMetadata,
    pub voter_records: Vec<LegacyVoterRecord>,
}

/// Import payload, resolved once at ingestion into a tagged union so the
/// format branch never leaks downstream.
#[derive(Debug, Clone)]
pub enum ImportPayload {
    /// Flat array of voter objects with embedded area fields
    Flat(Vec<FlatVoterRecord>),

    /// Legacy object with one metadata block for the whole batch
    Legacy(LegacyPayload),
}

impl ImportPayload {
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).context("Invalid JSON payload")?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_array() {
            let records: Vec<FlatVoterRecord> =
                serde_json::from_value(value).context("Invalid voter array")?;
            return Ok(ImportPayload::Flat(records));
        }

        if value.get("administrative_metadata").is_some() && value.get("voter_records").is_some() {
            let payload: LegacyPayload =
                serde_json::from_value(value).context("Invalid legacy payload")?;
            return Ok(ImportPayload::Legacy(payload));
        }

        bail!("Invalid JSON format. Expected array of voters or {{administrative_metadata, voter_records}}.")
    }

    /// Number of voter rows carried by the payload, before any filtering
    pub fn record_count(&self) -> usize {
        match self {
            ImportPayload::Flat(records) => records.len(),
            ImportPayload::Legacy(payload) => payload.voter_records.len(),
        }
    }

    /// Flatten to the canonical wire shape. Used by the batch coordinator,
    /// which chunks flat records regardless of how they were loaded.
    pub fn into_flat_records(self) -> Vec<FlatVoterRecord> {
        match self {
            ImportPayload::Flat(records) => records,
            ImportPayload::Legacy(payload) => {
                let meta = payload.administrative_metadata;
                payload
                    .voter_records
                    .into_iter()
                    .map(|record| record.into_flat(&meta))
                    .collect()
            }
        }
    }
}

// ============================================================================
// DIGIT & DATE NORMALIZATION
// ============================================================================

/// Translate Bengali digit glyphs (U+09E6..U+09EF) to ASCII digits.
/// Identifier equality must be script-insensitive because upstream source
/// documents mix numeral scripts. Idempotent by construction.
pub fn to_ascii_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{09E6}'..='\u{09EF}' => {
                char::from(b'0' + (c as u32 - 0x09E6) as u8)
            }
            _ => c,
        })
        .collect()
}

/// Parse a DD/MM/YYYY date of birth in either numeral script.
///
/// Fails soft: anything that does not split into exactly three numeric
/// segments yields None ("no date of birth"). Out-of-range day and month
/// values are NOT rejected; they roll forward mechanically, so 31/02/1990
/// parses to 1990-03-03. That mirrors how the published rolls have always
/// been ingested.
pub fn parse_dob(raw: &str) -> Option<NaiveDate> {
    if raw.is_empty() {
        return None;
    }

    let ascii = to_ascii_digits(raw);
    let parts: Vec<&str> = ascii.split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    let day: i64 = parts[0].trim().parse().ok()?;
    let month: i64 = parts[1].trim().parse().ok()?;
    let year: i32 = parts[2].trim().parse().ok()?;

    // Calendar arithmetic instead of validation: start at Jan 1 of the year,
    // then add (month - 1) months and (day - 1) days, letting both overflow.
    let base = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let months_off = month - 1;
    let with_month = if months_off >= 0 {
        base.checked_add_months(Months::new(months_off as u32))?
    } else {
        base.checked_sub_months(Months::new((-months_off) as u32))?
    };

    let days_off = day - 1;
    if days_off >= 0 {
        with_month.checked_add_days(Days::new(days_off as u64))
    } else {
        with_month.checked_sub_days(Days::new((-days_off) as u64))
    }
}

fn default_na(value: &str) -> String {
    if value.trim().is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        value.to_string()
    }
}

// ============================================================================
// CANONICAL RECORDS
// ============================================================================

/// Area fields accompanying the first record that references a code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaSeed {
    pub voter_area_code: String,
    pub district: String,
    pub upazila_thana: String,
    pub union_paurashava: String,
    pub ward_number: String,
    pub voter_area_name: String,
    pub post_office: String,
    pub post_code: String,
    pub total_voters: i64,
    pub total_male_voters: i64,
    pub publication_date: Option<NaiveDate>,
}

impl AreaSeed {
    /// Seed from a flat record. Flat extractions carry no postal metadata,
    /// so the post office falls back to the union name and the post code to
    /// the placeholder "0000".
    pub fn from_flat(record: &FlatVoterRecord) -> Self {
        AreaSeed {
            voter_area_code: to_ascii_digits(&record.voter_area_code),
            district: record.district.clone(),
            upazila_thana: record.upazila.clone(),
            union_paurashava: record.union_name.clone(),
            ward_number: to_ascii_digits(&record.ward_number),
            voter_area_name: record.voter_area.clone(),
            post_office: record.union_name.clone(),
            post_code: "0000".to_string(),
            total_voters: 0,
            total_male_voters: 0,
            publication_date: None,
        }
    }

    /// Seed from a legacy metadata block, which carries the full published
    /// area header including postal fields and counters.
    pub fn from_metadata(meta: &AdministrativeMetadata) -> Self {
        AreaSeed {
            voter_area_code: to_ascii_digits(&meta.voter_area_code),
            district: meta.district.clone(),
            upazila_thana: meta.upazila_thana.clone(),
            union_paurashava: meta.union_paurashava.clone(),
            ward_number: to_ascii_digits(&meta.ward_number),
            voter_area_name: meta.voter_area_name.clone(),
            post_office: meta.post_office.clone(),
            post_code: meta.post_code.clone(),
            total_voters: meta.total_voters,
            total_male_voters: meta.total_male_voters,
            publication_date: parse_dob(&meta.publication_date),
        }
    }
}

/// Canonical voter record: digits normalized, dates parsed, free-text
/// fields defaulted. Keeps the raw wire record for skip reporting.
#[derive(Debug, Clone)]
pub struct NormalizedVoter {
    pub sl_no: String,
    pub name: String,
    pub voter_id: String,
    pub father: String,
    pub mother: String,
    pub occupation: String,
    pub dob: Option<NaiveDate>,
    pub address: String,
    pub status: String,
    pub area: AreaSeed,
    pub raw: FlatVoterRecord,
}

/// A record excluded from the store, exported as {...original, reason}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRecord {
    #[serde(flatten)]
    pub record: FlatVoterRecord,

    pub reason: String,
}

/// Output of normalization: the records worth storing, the records dropped
/// up front, and the original input length for progress accounting.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedVoter>,
    pub skipped: Vec<SkippedRecord>,
    pub total_input: usize,
}

impl NormalizedBatch {
    /// Distinct area codes in first-sighting order
    pub fn area_codes(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for record in &self.records {
            if !seen.contains(&record.area.voter_area_code) {
                seen.push(record.area.voter_area_code.clone());
            }
        }
        seen
    }
}

/// Normalize a payload of either shape into canonical records.
///
/// Records whose status is explicitly "Deleted" or whose name is empty never
/// reach the store; they are reported as skipped instead.
pub fn normalize(payload: ImportPayload) -> NormalizedBatch {
    match payload {
        ImportPayload::Flat(records) => {
            let total = records.len();
            normalize_records(records, None, total)
        }
        ImportPayload::Legacy(payload) => {
            let seed = AreaSeed::from_metadata(&payload.administrative_metadata);
            let meta = payload.administrative_metadata;
            let flat: Vec<FlatVoterRecord> = payload
                .voter_records
                .into_iter()
                .map(|record| record.into_flat(&meta))
                .collect();
            let total = flat.len();
            normalize_records(flat, Some(seed), total)
        }
    }
}

fn normalize_records(
    records: Vec<FlatVoterRecord>,
    fixed_seed: Option<AreaSeed>,
    total_input: usize,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch {
        total_input,
        ..Default::default()
    };

    for record in records {
        if record.status == "Deleted" || record.name.trim().is_empty() {
            batch.skipped.push(SkippedRecord {
                record,
                reason: SKIP_EXCLUDED.to_string(),
            });
            continue;
        }

        let area = fixed_seed
            .clone()
            .unwrap_or_else(|| AreaSeed::from_flat(&record));

        let status = if record.status.is_empty() {
            "Active".to_string()
        } else {
            record.status.clone()
        };

        batch.records.push(NormalizedVoter {
            sl_no: to_ascii_digits(&record.serial_no),
            name: record.name.clone(),
            voter_id: to_ascii_digits(&record.voter_id),
            father: default_na(&record.father_name),
            mother: default_na(&record.mother_name),
            occupation: default_na(&record.occupation),
            dob: parse_dob(&record.date_of_birth),
            address: default_na(&record.address),
            status,
            area,
            raw: record,
        });
    }

    batch
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_record(voter_id: &str, name: &str) -> FlatVoterRecord {
        FlatVoterRecord {
            serial_no: "1".to_string(),
            name: name.to_string(),
            voter_id: voter_id.to_string(),
            father_name: "Father".to_string(),
            mother_name: "Mother".to_string(),
            occupation: "Farmer".to_string(),
            date_of_birth: "01/01/1990".to_string(),
            address: "Village Road".to_string(),
            district: "Dhaka".to_string(),
            upazila: "Savar".to_string(),
            union_name: "Tetuljhora".to_string(),
            ward_number: "4".to_string(),
            voter_area: "Tetuljhora East".to_string(),
            voter_area_code: "0123".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_bengali_digits_translate_to_ascii() {
        assert_eq!(to_ascii_digits("০১২৩৪৫৬৭৮৯"), "0123456789");
        assert_eq!(to_ascii_digits("৯৮৭"), "987");
        // Mixed scripts and non-digits pass through
        assert_eq!(to_ascii_digits("ward-৪/Ka"), "ward-4/Ka");
    }

    #[test]
    fn test_digit_normalization_is_idempotent() {
        let once = to_ascii_digits("০১২abc৯");
        let twice = to_ascii_digits(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_dob_plain() {
        assert_eq!(
            parse_dob("25/12/1985"),
            NaiveDate::from_ymd_opt(1985, 12, 25)
        );
    }

    #[test]
    fn test_parse_dob_bengali_numerals() {
        // ১৫/০৬/১৯৯০ = 15/06/1990
        assert_eq!(
            parse_dob("১৫/০৬/১৯৯০"),
            NaiveDate::from_ymd_opt(1990, 6, 15)
        );
    }

    #[test]
    fn test_parse_dob_overflows_instead_of_rejecting() {
        // Feb 31 1990 rolls forward to Mar 3 (1990 is not a leap year)
        assert_eq!(
            parse_dob("31/02/1990"),
            NaiveDate::from_ymd_opt(1990, 3, 3)
        );

        // Month 13 rolls into January of the next year
        assert_eq!(
            parse_dob("01/13/1990"),
            NaiveDate::from_ymd_opt(1991, 1, 1)
        );
    }

    #[test]
    fn test_parse_dob_fails_soft() {
        assert_eq!(parse_dob(""), None);
        assert_eq!(parse_dob("1990-01-15"), None);
        assert_eq!(parse_dob("15/06"), None);
        assert_eq!(parse_dob("a/b/c"), None);
        assert_eq!(parse_dob("15/06/1990/extra"), None);
    }

    #[test]
    fn test_payload_shape_detection() {
        let flat = ImportPayload::parse(r#"[{"name":"A","voter_id":"1"}]"#).unwrap();
        assert!(matches!(flat, ImportPayload::Flat(_)));

        let legacy = ImportPayload::parse(
            r#"{"administrative_metadata":{"voter_area_code":"01"},"voter_records":[]}"#,
        )
        .unwrap();
        assert!(matches!(legacy, ImportPayload::Legacy(_)));

        assert!(ImportPayload::parse(r#"{"foo":1}"#).is_err());
        assert!(ImportPayload::parse("not json").is_err());
    }

    #[test]
    fn test_normalize_defaults_missing_fields_to_na() {
        let record = FlatVoterRecord {
            name: "Rahim".to_string(),
            voter_id: "০০১".to_string(),
            voter_area_code: "12".to_string(),
            ..Default::default()
        };

        let batch = normalize(ImportPayload::Flat(vec![record]));
        assert_eq!(batch.records.len(), 1);

        let voter = &batch.records[0];
        assert_eq!(voter.voter_id, "001");
        assert_eq!(voter.father, "N/A");
        assert_eq!(voter.mother, "N/A");
        assert_eq!(voter.occupation, "N/A");
        assert_eq!(voter.address, "N/A");
        assert_eq!(voter.dob, None);
        assert_eq!(voter.status, "Active");
    }

    #[test]
    fn test_normalize_excludes_deleted_and_nameless() {
        let mut deleted = flat_record("002", "Karim");
        deleted.status = "Deleted".to_string();
        let nameless = flat_record("003", "   ");
        let kept = flat_record("004", "Salam");

        let batch = normalize(ImportPayload::Flat(vec![deleted, nameless, kept]));

        assert_eq!(batch.total_input, 3);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.skipped.len(), 2);
        assert!(batch.skipped.iter().all(|s| s.reason == SKIP_EXCLUDED));
    }

    #[test]
    fn test_legacy_and_flat_converge() {
        let legacy = ImportPayload::parse(
            r#"{
                "administrative_metadata": {
                    "district": "Dhaka",
                    "upazila_thana": "Savar",
                    "union_paurashava": "Tetuljhora",
                    "ward_number": "৪",
                    "voter_area_name": "Tetuljhora East",
                    "voter_area_code": "০১২৩",
                    "post_office": "Savar PO",
                    "post_code": "1340"
                },
                "voter_records": [
                    {"sl_no": "১", "name": "Rahim", "voter_id": "০০১২৪১",
                     "father": "Karim", "mother": "Fatema",
                     "occupation": "Farmer", "dob": "০১/০১/১৯৯০",
                     "address": "Village Road"}
                ]
            }"#,
        )
        .unwrap();

        let batch = normalize(legacy);
        assert_eq!(batch.records.len(), 1);

        let voter = &batch.records[0];
        assert_eq!(voter.sl_no, "1");
        assert_eq!(voter.voter_id, "001241");
        assert_eq!(voter.father, "Karim");
        assert_eq!(voter.dob, NaiveDate::from_ymd_opt(1990, 1, 1));
        assert_eq!(voter.area.voter_area_code, "0123");
        assert_eq!(voter.area.ward_number, "4");
        // Legacy metadata keeps its real postal fields
        assert_eq!(voter.area.post_office, "Savar PO");
        assert_eq!(voter.area.post_code, "1340");
    }

    #[test]
    fn test_flat_area_seed_postal_defaults() {
        let record = flat_record("001", "Rahim");
        let seed = AreaSeed::from_flat(&record);

        assert_eq!(seed.post_office, "Tetuljhora");
        assert_eq!(seed.post_code, "0000");
        assert_eq!(seed.total_voters, 0);
    }

    #[test]
    fn test_area_codes_first_sighting_order() {
        let mut a = flat_record("001", "A");
        a.voter_area_code = "0200".to_string();
        let mut b = flat_record("002", "B");
        b.voter_area_code = "0100".to_string();
        let mut c = flat_record("003", "C");
        c.voter_area_code = "0200".to_string();

        let batch = normalize(ImportPayload::Flat(vec![a, b, c]));
        assert_eq!(batch.area_codes(), vec!["0200", "0100"]);
    }

    #[test]
    fn test_skipped_record_export_keeps_unknown_fields() {
        let payload = ImportPayload::parse(
            r#"[{"name": "", "voter_id": "007", "gender": "male"}]"#,
        )
        .unwrap();

        let batch = normalize(payload);
        assert_eq!(batch.skipped.len(), 1);

        let exported = serde_json::to_value(&batch.skipped[0]).unwrap();
        assert_eq!(exported["gender"], "male");
        assert_eq!(exported["reason"], SKIP_EXCLUDED);
    }
}
