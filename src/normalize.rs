// 🔄 Normalizer - Raw tokens → canonical roster encodings
//
// Every lookup here is also the validator's acceptance test: a token is
// valid exactly when it has a canonical form. Unrecognised tokens map to
// None rather than passing through.

use crate::error::ValidationError;
use crate::student::{Gender, RawStudentRecord, StudentFlags, StudentRecord};
use chrono::NaiveDate;

/// Accepted date layouts, in priority order (day/month/year first)
pub const DATE_FORMATS: [&str; 2] = ["%d/%m/%Y", "%b %d %Y"];

/// Punctuation that survives free-text sanitization
const ALLOWED_PUNCTUATION: [char; 4] = ['-', ' ', '.', '_'];

// ============================================================================
// TOKEN TABLES
// ============================================================================

/// Boolean flag token → value
///
/// {0, N, No, F, False} → false, {1, Y, Yes, T, True} → true (any case)
pub fn normalize_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "0" | "N" | "NO" | "F" | "FALSE" => Some(false),
        "1" | "Y" | "YES" | "T" | "TRUE" => Some(true),
        _ => None,
    }
}

/// Gender token → canonical gender
///
/// M/MALE → MALE, F/FEMAL/FEMALE → FEMAL
pub fn normalize_gender(raw: &str) -> Option<Gender> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "M" | "MALE" => Some(Gender::Male),
        "F" | "FEMAL" | "FEMALE" => Some(Gender::Female),
        _ => None,
    }
}

/// Year-level token → canonical label
///
/// 1–9 are zero padded, 0/00/P become the foundation label "F",
/// 10–12, F and UG are already canonical.
pub fn normalize_year_level(raw: &str) -> Option<String> {
    let token = raw.trim().to_ascii_uppercase();

    match token.as_str() {
        "F" | "P" => return Some("F".to_string()),
        "UG" => return Some("UG".to_string()),
        _ => {}
    }

    if token.is_empty() || token.len() > 2 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    match token.parse::<u8>().ok()? {
        0 => Some("F".to_string()),
        n @ 1..=9 => Some(format!("{:02}", n)),
        n @ 10..=12 => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a birth date using the first format that matches
///
/// Both formats end in a four-digit year; anything shorter is rejected.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    // Upstream extracts pad single-digit days with an extra space ("Jan  1 2017")
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let year = collapsed.rsplit(|c: char| c == '/' || c == ' ').next()?;
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&collapsed, format).ok())
}

// ============================================================================
// FREE TEXT
// ============================================================================

/// Strip everything except letters, digits and `- . _` / space
pub fn sanitize_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || ALLOWED_PUNCTUATION.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Optional text: sanitized, and blank collapses to ""
pub fn normalize_optional(raw: &str) -> String {
    let cleaned = sanitize_text(raw);
    if cleaned.trim().is_empty() {
        String::new()
    } else {
        cleaned
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// Build the canonical record for a row that already passed validation
///
/// Returns the offending fields if a lookup has no canonical form, which
/// only happens when the validator and these tables disagree.
pub fn normalize_record(raw: &RawStudentRecord) -> Result<StudentRecord, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut flag = |field: &str, value: &str| {
        normalize_flag(value).unwrap_or_else(|| {
            errors.push(ValidationError::new(field, "no canonical boolean form"));
            false
        })
    };

    let flags = StudentFlags {
        lbote: flag("LBOTE", &raw.lbote),
        atsi: flag("ATSI", &raw.atsi),
        disability: flag("disability_status", &raw.disability_status),
        ema: flag("EMA", &raw.ema),
        esl: flag("ESL", &raw.esl),
    };

    let gender = normalize_gender(&raw.gender);
    if gender.is_none() {
        errors.push(ValidationError::new("gender", "no canonical gender form"));
    }

    let birth_date = parse_date(&raw.date_of_birth);
    if birth_date.is_none() {
        errors.push(ValidationError::new("date_of_birth", "no accepted date format matched"));
    }

    let first_name = sanitize_text(&raw.first_name);
    if first_name.is_empty() {
        errors.push(ValidationError::new("first_name", "empty after sanitization"));
    }

    let surname = sanitize_text(&raw.surname);
    if surname.is_empty() {
        errors.push(ValidationError::new("surname", "empty after sanitization"));
    }

    let year_level = normalize_year_level(&raw.year_level);
    if year_level.is_none() {
        errors.push(ValidationError::new("year_level", "no canonical year level form"));
    }

    match (gender, birth_date, year_level) {
        (Some(gender), Some(birth_date), Some(year_level)) if errors.is_empty() => {
            Ok(StudentRecord {
                student_code: raw.student_code.trim().to_string(),
                first_name,
                middle_name: normalize_optional(&raw.middle_name),
                surname,
                gender,
                birth_date,
                flags,
                home_group: normalize_optional(&raw.home_group),
                year_level,
                line_number: raw.line_number,
            })
        }
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_raw() -> RawStudentRecord {
        RawStudentRecord {
            student_code: "S001".to_string(),
            first_name: "Ada".to_string(),
            middle_name: String::new(),
            surname: "Lovelace".to_string(),
            gender: "F".to_string(),
            date_of_birth: "10/12/2015".to_string(),
            lbote: "N".to_string(),
            atsi: "0".to_string(),
            disability_status: "False".to_string(),
            ema: "Yes".to_string(),
            esl: "T".to_string(),
            home_group: "3A".to_string(),
            year_level: "3".to_string(),
            line_number: 2,
        }
    }

    #[test]
    fn test_year_level_mapping() {
        assert_eq!(normalize_year_level("1").as_deref(), Some("01"));
        assert_eq!(normalize_year_level("9").as_deref(), Some("09"));
        assert_eq!(normalize_year_level("10").as_deref(), Some("10"));
        assert_eq!(normalize_year_level("12").as_deref(), Some("12"));
        assert_eq!(normalize_year_level("P").as_deref(), Some("F"));
        assert_eq!(normalize_year_level("0").as_deref(), Some("F"));
        assert_eq!(normalize_year_level("00").as_deref(), Some("F"));
        assert_eq!(normalize_year_level("UG").as_deref(), Some("UG"));
        assert_eq!(normalize_year_level("13"), None);
        assert_eq!(normalize_year_level("007"), None);
        assert_eq!(normalize_year_level("K"), None);
        assert_eq!(normalize_year_level(""), None);
    }

    #[test]
    fn test_flag_mapping() {
        assert_eq!(normalize_flag("Y"), Some(true));
        assert_eq!(normalize_flag("False"), Some(false));
        assert_eq!(normalize_flag("1"), Some(true));
        assert_eq!(normalize_flag("0"), Some(false));
        assert_eq!(normalize_flag("no"), Some(false));
        assert_eq!(normalize_flag("maybe"), None);
    }

    #[test]
    fn test_gender_mapping() {
        assert_eq!(normalize_gender("M"), Some(Gender::Male));
        assert_eq!(normalize_gender("F"), Some(Gender::Female));
        assert_eq!(normalize_gender("FEMALE"), Some(Gender::Female));
        assert_eq!(normalize_gender("FEMAL"), Some(Gender::Female));
        assert_eq!(normalize_gender("X"), None);
    }

    #[test]
    fn test_canonical_tokens_are_fixed_points() {
        for raw in ["1", "P", "0", "10", "UG", "F"] {
            let once = normalize_year_level(raw).unwrap();
            assert_eq!(normalize_year_level(&once), Some(once.clone()));
        }

        for raw in ["M", "F", "FEMALE", "MALE"] {
            let once = normalize_gender(raw).unwrap();
            assert_eq!(normalize_gender(once.as_str()), Some(once));
        }

        for raw in ["Y", "N", "True", "0"] {
            let once = normalize_flag(raw).unwrap();
            let canonical = crate::student::flag_label(once);
            assert_eq!(normalize_flag(canonical), Some(once));
        }
    }

    #[test]
    fn test_both_date_formats_agree() {
        let expected = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();

        assert_eq!(parse_date("1/01/2017"), Some(expected));
        assert_eq!(parse_date("Jan 1 2017"), Some(expected));
        assert_eq!(parse_date("Jan  1 2017"), Some(expected));
    }

    #[test]
    fn test_day_month_order() {
        assert_eq!(
            parse_date("13/02/2016"),
            NaiveDate::from_ymd_opt(2016, 2, 13)
        );
        assert_eq!(parse_date("31/02/2016"), None);
        assert_eq!(parse_date("2016-02-13"), None);
        assert_eq!(parse_date("1/01/17"), None);
        assert_eq!(parse_date("Jan 1 17"), None);
        assert_eq!(parse_date("1/01/02017"), None);
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("O'Brien"), "OBrien");
        assert_eq!(sanitize_text("Mary-Jane St. Clair"), "Mary-Jane St. Clair");
        assert_eq!(sanitize_text("Robert'); DROP TABLE--"), "Robert DROP TABLE--");
        assert_eq!(sanitize_text("  Zoë  "), "Zoë");
    }

    #[test]
    fn test_optional_collapses_blank() {
        assert_eq!(normalize_optional("   "), "");
        assert_eq!(normalize_optional("''"), "");
        assert_eq!(normalize_optional(" 7B "), "7B");
    }

    #[test]
    fn test_normalize_record() {
        let raw = create_test_raw();
        let record = normalize_record(&raw).unwrap();

        assert_eq!(record.gender, Gender::Female);
        assert_eq!(record.year_level, "03");
        assert_eq!(record.birth_date, NaiveDate::from_ymd_opt(2015, 12, 10).unwrap());
        assert_eq!(
            record.flags,
            StudentFlags { lbote: false, atsi: false, disability: false, ema: true, esl: true }
        );
        assert_eq!(record.middle_name, "");
        assert_eq!(record.line_number, 2);
    }

    #[test]
    fn test_normalize_record_rejects_names_sanitized_away() {
        let mut raw = create_test_raw();
        raw.first_name = "'''".to_string();

        let errors = normalize_record(&raw).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "first_name");
    }

    #[test]
    fn test_normalize_record_reports_unmapped_fields() {
        let mut raw = create_test_raw();
        raw.gender = "X".to_string();
        raw.esl = "perhaps".to_string();

        let errors = normalize_record(&raw).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["ESL", "gender"]);
    }
}
