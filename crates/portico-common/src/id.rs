/// Length of short hex IDs generated from UUID v7 (e.g., "0196a3b4").
const SHORT_ID_LEN: usize = 8;

/// Generate a full workspace identifier (hyphenated UUID v7).
///
/// v7 keeps identifiers time-ordered, so the status listing sorts by
/// creation time when sorted by id.
pub fn generate_workspace_id() -> String {
    uuid::Uuid::now_v7().hyphenated().to_string()
}

/// Generate a short 8-character hex ID from UUID v7.
///
/// Takes the last 8 hex characters, which come from the random portion,
/// so two IDs minted in the same millisecond still differ. Used to keep
/// concurrent staging files apart.
pub fn generate_short_id() -> String {
    let full = uuid::Uuid::now_v7().simple().to_string();
    full[full.len() - SHORT_ID_LEN..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generate_short_id_has_correct_length() {
        assert_eq!(generate_short_id().len(), SHORT_ID_LEN);
    }

    #[test]
    fn generate_short_id_is_lowercase_hex() {
        let id = generate_short_id();
        assert!(id
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generate_short_id_is_unique_across_calls() {
        let ids: HashSet<String> = (0..100).map(|_| generate_short_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn workspace_id_parses_as_uuid() {
        let id = generate_workspace_id();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
