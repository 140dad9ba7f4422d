//! Query entity recognition for the domain-filtered retrieval stage.
//!
//! A small, auditable keyword table maps query terms onto atom categories
//! and equipment names. The domain-filter stage re-runs semantic search
//! restricted to the recognized category.

use once_cell::sync::Lazy;

use faultline_core::AtomCategory;

static CATEGORY_TERMS: Lazy<Vec<(&'static str, AtomCategory)>> = Lazy::new(|| {
    vec![
        ("breaker", AtomCategory::Electrical),
        ("relay", AtomCategory::Electrical),
        ("fuse", AtomCategory::Electrical),
        ("voltage", AtomCategory::Electrical),
        ("current", AtomCategory::Electrical),
        ("wiring", AtomCategory::Electrical),
        ("overload", AtomCategory::Electrical),
        ("phase", AtomCategory::Electrical),
        ("bearing", AtomCategory::Mechanical),
        ("gearbox", AtomCategory::Mechanical),
        ("shaft", AtomCategory::Mechanical),
        ("belt", AtomCategory::Mechanical),
        ("coupling", AtomCategory::Mechanical),
        ("vibration", AtomCategory::Mechanical),
        ("alignment", AtomCategory::Mechanical),
        ("hydraulic", AtomCategory::Hydraulic),
        ("valve", AtomCategory::Hydraulic),
        ("cylinder", AtomCategory::Hydraulic),
        ("cavitation", AtomCategory::Hydraulic),
        ("pneumatic", AtomCategory::Pneumatic),
        ("airline", AtomCategory::Pneumatic),
        ("regulator", AtomCategory::Pneumatic),
        ("plc", AtomCategory::Controls),
        ("hmi", AtomCategory::Controls),
        ("sensor", AtomCategory::Controls),
        ("encoder", AtomCategory::Controls),
        ("vfd", AtomCategory::Controls),
        ("drive", AtomCategory::Controls),
        ("firmware", AtomCategory::Software),
        ("software", AtomCategory::Software),
        ("lockout", AtomCategory::Safety),
        ("tagout", AtomCategory::Safety),
        ("guard", AtomCategory::Safety),
        ("ppe", AtomCategory::Safety),
        ("arc", AtomCategory::Safety),
    ]
});

static EQUIPMENT_TERMS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "motor",
        "pump",
        "compressor",
        "conveyor",
        "crane",
        "hoist",
        "boiler",
        "chiller",
        "press",
        "fan",
        "turbine",
        "generator",
    ]
});

/// Entities recognized in a query.
#[derive(Debug, Clone, Default)]
pub struct QueryEntities {
    /// Categories implied by the query terms, deduplicated, first-seen order.
    pub categories: Vec<AtomCategory>,
    /// Equipment names mentioned by the query.
    pub equipment: Vec<String>,
}

impl QueryEntities {
    /// The category the domain-filter stage restricts to, if exactly
    /// derivable. Ambiguous queries (several categories) yield the first
    /// recognized one; no category yields `None`.
    pub fn primary_category(&self) -> Option<AtomCategory> {
        self.categories.first().copied()
    }

    /// True when the query touches more than one category.
    pub fn is_multi_domain(&self) -> bool {
        self.categories.len() > 1
    }
}

/// Recognize category and equipment entities in a query.
pub fn recognize(query: &str) -> QueryEntities {
    let mut entities = QueryEntities::default();
    for raw in query.split_whitespace() {
        let token: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if token.is_empty() {
            continue;
        }
        for (term, category) in CATEGORY_TERMS.iter() {
            if token == *term && !entities.categories.contains(category) {
                entities.categories.push(*category);
            }
        }
        for term in EQUIPMENT_TERMS.iter() {
            if token == *term && !entities.equipment.contains(&token) {
                entities.equipment.push(token.clone());
            }
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizes_category_terms() {
        let entities = recognize("breaker keeps tripping under load");
        assert_eq!(entities.primary_category(), Some(AtomCategory::Electrical));
        assert!(!entities.is_multi_domain());
    }

    #[test]
    fn test_recognizes_equipment() {
        let entities = recognize("the conveyor motor is noisy");
        assert_eq!(entities.equipment, vec!["conveyor", "motor"]);
    }

    #[test]
    fn test_multi_domain_query() {
        let entities = recognize("pump bearing noise and breaker trips");
        assert!(entities.is_multi_domain());
        assert!(entities.categories.contains(&AtomCategory::Mechanical));
        assert!(entities.categories.contains(&AtomCategory::Electrical));
    }

    #[test]
    fn test_punctuation_and_case_ignored() {
        let entities = recognize("Overload! RELAY, tripped.");
        assert_eq!(entities.primary_category(), Some(AtomCategory::Electrical));
    }

    #[test]
    fn test_no_entities() {
        let entities = recognize("what is the meaning of this");
        assert!(entities.categories.is_empty());
        assert!(entities.equipment.is_empty());
        assert_eq!(entities.primary_category(), None);
    }
}
