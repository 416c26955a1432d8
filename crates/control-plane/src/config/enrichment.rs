// Enrichment endpoint and result sinks.
// Decision: The upsert sink needs URL, JWT and object type ID together; partial config disables it

/// Where and how to enrich task inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentConfig {
    /// NOSCOPE_ENRICH_URL
    pub enrich_url: String,
    /// NOSCOPE_KEY, sent as `x-api-key`
    pub api_key: String,
    pub upsert: Option<UpsertSink>,
    pub tags: Option<TagSink>,
}

/// Object-type upsert of the enrichment result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertSink {
    pub url: String,
    pub jwt: String,
    pub object_type_id: String,
}

/// Tagging of the object with the result's labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSink {
    pub url: String,
    pub jwt: Option<String>,
}

impl EnrichmentConfig {
    /// Build from a lookup that already drops empty values
    pub(crate) fn from_lookup(get: &impl Fn(&str) -> Option<String>) -> Option<Self> {
        let enrich_url = get("NOSCOPE_ENRICH_URL")?;
        let api_key = get("NOSCOPE_KEY")?;
        let jwt = get("MUNINN_JWT");

        let upsert = match (
            get("MUNINN_UPSERT_OBJTYPE_URL"),
            jwt.clone(),
            get("MUNINN_NOSCOPE_OBJTYPE_ID"),
        ) {
            (Some(url), Some(jwt), Some(object_type_id)) => Some(UpsertSink {
                url,
                jwt,
                object_type_id,
            }),
            _ => None,
        };
        let tags = get("MUNINN_TAGS_OBJ_URL").map(|url| TagSink { url, jwt });

        Some(Self {
            enrich_url,
            api_key,
            upsert,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Option<EnrichmentConfig> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        EnrichmentConfig::from_lookup(&|key: &str| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_requires_url_and_key() {
        assert!(load(&[]).is_none());
        assert!(load(&[("NOSCOPE_ENRICH_URL", "http://enrich")]).is_none());

        let config = load(&[("NOSCOPE_ENRICH_URL", "http://enrich"), ("NOSCOPE_KEY", "k")]).unwrap();
        assert_eq!(config.enrich_url, "http://enrich");
        assert!(config.upsert.is_none());
        assert!(config.tags.is_none());
    }

    #[test]
    fn test_sinks() {
        let config = load(&[
            ("NOSCOPE_ENRICH_URL", "http://enrich"),
            ("NOSCOPE_KEY", "k"),
            ("MUNINN_UPSERT_OBJTYPE_URL", "http://upsert"),
            ("MUNINN_JWT", "jwt"),
            ("MUNINN_TAGS_OBJ_URL", "http://tags"),
        ])
        .unwrap();
        // Object type ID missing
        assert!(config.upsert.is_none());
        assert_eq!(
            config.tags,
            Some(TagSink {
                url: "http://tags".into(),
                jwt: Some("jwt".into()),
            })
        );

        let config = load(&[
            ("NOSCOPE_ENRICH_URL", "http://enrich"),
            ("NOSCOPE_KEY", "k"),
            ("MUNINN_UPSERT_OBJTYPE_URL", "http://upsert"),
            ("MUNINN_JWT", "jwt"),
            ("MUNINN_NOSCOPE_OBJTYPE_ID", "type-1"),
        ])
        .unwrap();
        assert_eq!(config.upsert.unwrap().object_type_id, "type-1");
    }
}
