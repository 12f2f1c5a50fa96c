//! Structured partial-update descriptors.
//!
//! An [`UpdateDescriptor`] is a list of set-clauses in which every attribute
//! name goes through an alias (`#f0`) and every value through a placeholder
//! (`:v0`). Backends with an expression language render it with
//! [`UpdateDescriptor::expression`]; others apply
//! [`UpdateDescriptor::assignments`] directly. Because names are always
//! aliased, attributes that collide with reserved words such as `status`
//! never appear verbatim in the expression.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Assignment {
    attribute: String,
    value: String,
}

/// Set-clauses for a partial update, built with [`UpdateBuilder`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateDescriptor {
    assignments: Vec<Assignment>,
}

impl UpdateDescriptor {
    pub fn builder() -> UpdateBuilder {
        UpdateBuilder::default()
    }

    /// Returns `true` if the descriptor sets nothing.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Iterates over `(attribute, value)` pairs in clause order.
    pub fn assignments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignments
            .iter()
            .map(|a| (a.attribute.as_str(), a.value.as_str()))
    }

    /// Renders the update expression, e.g. `SET #f0 = :v0, #f1 = :v1`.
    ///
    /// Empty for an empty descriptor.
    pub fn expression(&self) -> String {
        if self.assignments.is_empty() {
            return String::new();
        }
        let clauses: Vec<String> = (0..self.assignments.len())
            .map(|i| format!("{} = {}", name_alias(i), value_placeholder(i)))
            .collect();
        format!("SET {}", clauses.join(", "))
    }

    /// Alias table mapping `#fN` to the real attribute name.
    pub fn attribute_names(&self) -> HashMap<String, String> {
        self.assignments
            .iter()
            .enumerate()
            .map(|(i, a)| (name_alias(i), a.attribute.clone()))
            .collect()
    }

    /// Placeholder table mapping `:vN` to the new value.
    pub fn attribute_values(&self) -> HashMap<String, String> {
        self.assignments
            .iter()
            .enumerate()
            .map(|(i, a)| (value_placeholder(i), a.value.clone()))
            .collect()
    }
}

fn name_alias(index: usize) -> String {
    format!("#f{index}")
}

fn value_placeholder(index: usize) -> String {
    format!(":v{index}")
}

/// Folds present fields into an [`UpdateDescriptor`].
#[derive(Debug, Default)]
pub struct UpdateBuilder {
    assignments: Vec<Assignment>,
}

impl UpdateBuilder {
    /// Sets `attribute` to `value`. Setting an attribute again replaces the
    /// earlier value but keeps its position.
    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        let attribute = attribute.into();
        let value = value.into();
        match self
            .assignments
            .iter_mut()
            .find(|a| a.attribute == attribute)
        {
            Some(existing) => existing.value = value,
            None => self.assignments.push(Assignment { attribute, value }),
        }
        self
    }

    /// Sets `attribute` only when `value` is `Some`.
    pub fn set_if_present(self, attribute: impl Into<String>, value: Option<String>) -> Self {
        match value {
            Some(value) => self.set(attribute, value),
            None => self,
        }
    }

    pub fn build(self) -> UpdateDescriptor {
        UpdateDescriptor {
            assignments: self.assignments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_render_expression_with_aliases_for_every_attribute() {
        let update = UpdateDescriptor::builder()
            .set("updated_at", "2025-01-01T00:00:00.000000Z")
            .set("status", "done")
            .build();

        assert_eq!(update.expression(), "SET #f0 = :v0, #f1 = :v1");
        assert_eq!(
            update.attribute_names(),
            HashMap::from([
                ("#f0".to_string(), "updated_at".to_string()),
                ("#f1".to_string(), "status".to_string()),
            ])
        );
        assert_eq!(
            update.attribute_values(),
            HashMap::from([
                (":v0".to_string(), "2025-01-01T00:00:00.000000Z".to_string()),
                (":v1".to_string(), "done".to_string()),
            ])
        );
    }

    #[test]
    fn reserved_word_never_appears_in_expression() {
        let update = UpdateDescriptor::builder().set("status", "done").build();

        assert!(!update.expression().contains("status"));
    }

    #[test]
    fn can_skip_absent_fields() {
        let update = UpdateDescriptor::builder()
            .set_if_present("title", None)
            .set_if_present("description", Some("new".to_string()))
            .build();

        let assignments: Vec<_> = update.assignments().collect();
        assert_eq!(assignments, vec![("description", "new")]);
    }

    #[test]
    fn setting_twice_keeps_last_value_in_first_position() {
        let update = UpdateDescriptor::builder()
            .set("title", "first")
            .set("status", "pending")
            .set("title", "second")
            .build();

        let assignments: Vec<_> = update.assignments().collect();
        assert_eq!(assignments, vec![("title", "second"), ("status", "pending")]);
    }

    #[test]
    fn value_text_is_not_spliced_into_expression() {
        let update = UpdateDescriptor::builder()
            .set("title", "x, #f0 = :v9 REMOVE id")
            .build();

        assert_eq!(update.expression(), "SET #f0 = :v0");
    }

    #[test]
    fn empty_descriptor_renders_nothing() {
        let update = UpdateDescriptor::builder().build();

        assert!(update.is_empty());
        assert_eq!(update.expression(), "");
    }
}
