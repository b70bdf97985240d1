//! SOQL safety utilities.
//!
//! All user-provided values that end up in query text MUST pass through this
//! module. Identifier checks reject anything outside the alphanumeric +
//! underscore shape; string values are escaped for SOQL literals.

/// SOQL escaping utilities for injection prevention.
pub mod soql {
    /// Escape a string value for use in a SOQL string literal.
    ///
    /// ```rust
    /// use fundwise_sf_client::security::soql;
    ///
    /// assert_eq!(soql::escape_string("O'Brien"), "O\\'Brien");
    /// ```
    #[must_use]
    pub fn escape_string(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len() + 16);
        for ch in value.chars() {
            match ch {
                '\'' => escaped.push_str("\\'"),
                '\\' => escaped.push_str("\\\\"),
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                '\t' => escaped.push_str("\\t"),
                _ => escaped.push(ch),
            }
        }
        escaped
    }

    /// Escape a value for use in a SOQL LIKE clause.
    ///
    /// In addition to standard string escaping, LIKE wildcards (`%`, `_`)
    /// are escaped to prevent pattern injection.
    #[must_use]
    pub fn escape_like(value: &str) -> String {
        let base_escaped = escape_string(value);
        let mut escaped = String::with_capacity(base_escaped.len() + 8);
        for ch in base_escaped.chars() {
            match ch {
                '%' => escaped.push_str("\\%"),
                '_' => escaped.push_str("\\_"),
                _ => escaped.push(ch),
            }
        }
        escaped
    }

    /// Validate that a field name contains only safe characters.
    ///
    /// Field names must start with a letter and contain only alphanumerics
    /// and underscores (which covers the `__c`/`__r` custom suffixes).
    #[must_use]
    pub fn is_safe_field_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {}
            _ => return false,
        }
        chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    }

    /// Validate that an sObject name is safe. Same rules as field names.
    #[must_use]
    pub fn is_safe_sobject_name(name: &str) -> bool {
        is_safe_field_name(name)
    }
}

/// Record identifier utilities.
pub mod id {
    /// Validate that a Salesforce record ID has the correct format:
    /// 15 or 18 alphanumeric characters.
    #[must_use]
    pub fn is_valid_record_id(id: &str) -> bool {
        let len = id.len();
        (len == 15 || len == 18) && id.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// Returns true if the ID is a Contact record ID (key prefix `003`).
    #[must_use]
    pub fn is_contact_id(id: &str) -> bool {
        is_valid_record_id(id) && id.starts_with("003")
    }
}
