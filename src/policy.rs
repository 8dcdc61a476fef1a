use crate::template::{normalize, FieldSpec, ParameterSet, TemplateKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Required fields still absent or invalid, in schema declaration order.
    pub missing: Vec<&'static FieldSpec>,
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn missing_names(&self) -> Vec<&'static str> {
        self.missing.iter().map(|f| f.name).collect()
    }
}

/// Decides whether the parameter set can be rendered with `template`.
/// Optional fields never block; stored values are re-checked against their predicate.
pub fn evaluate(template: TemplateKind, params: &ParameterSet) -> Completion {
    let missing = template
        .fields()
        .iter()
        .filter(|spec| spec.required)
        .filter(|spec| match params.get(spec.name) {
            Some(value) => normalize(spec.kind, value).is_err(),
            None => true,
        })
        .collect();
    Completion { missing }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn params(template: TemplateKind, pairs: &[(&str, &str)]) -> ParameterSet {
        let raw: BTreeMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let mut set = ParameterSet::default();
        set.merge(template, &raw);
        set
    }

    #[test]
    fn empty_set_reports_required_fields_in_declaration_order() {
        let completion = evaluate(TemplateKind::ModernHome, &ParameterSet::default());
        assert!(!completion.is_complete());
        assert_eq!(
            completion.missing_names(),
            vec!["image_url", "property_price", "headline", "accent_color"]
        );
    }

    #[test]
    fn ordering_is_stable_across_evaluations() {
        let set = params(TemplateKind::ModernHome, &[("property_price", "$5"), ("accent_color", "red")]);
        let first = evaluate(TemplateKind::ModernHome, &set);
        for _ in 0..10 {
            assert_eq!(evaluate(TemplateKind::ModernHome, &set), first);
        }
        assert_eq!(first.missing_names(), vec!["image_url", "headline"]);
    }

    #[test]
    fn optional_fields_never_block() {
        let set = params(
            TemplateKind::HouseAgent,
            &[("image_url", "https://x/a.jpg"), ("headline", "HOUSE"), ("accent_color", "#fff")],
        );
        assert!(evaluate(TemplateKind::HouseAgent, &set).is_complete());
    }

    #[test]
    fn requirements_depend_on_template() {
        let set = params(
            TemplateKind::ModernHome,
            &[("image_url", "https://x/a.jpg"), ("headline", "LUXURY"), ("accent_color", "gold")],
        );
        assert_eq!(evaluate(TemplateKind::ModernHome, &set).missing_names(), vec!["property_price"]);
        assert!(evaluate(TemplateKind::BestHome, &set).is_complete());
    }
}
