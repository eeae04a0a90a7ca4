//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Typed input and output ports of pipeline services."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::Display;

/// Direction of a connector relative to its owning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

/// A named, typed port representing one pipeline edge of a service.
///
/// The `id` is the channel identity used to match producers and consumers;
/// `name` is the human-facing label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedDataConnector {
    id: String,
    name: String,
    description: String,
    payload_type: String,
    direction: Direction,
    target_service: Option<String>,
    target_function: Option<String>,
}

impl TypedDataConnector {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        payload_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            payload_type: payload_type.into(),
            direction,
            target_service: None,
            target_function: None,
        }
    }

    /// Convenience constructor for an input port whose name equals its id.
    pub fn input(id: impl Into<String>, payload_type: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, payload_type, Direction::Input)
    }

    /// Convenience constructor for an output port whose name equals its id.
    pub fn output(id: impl Into<String>, payload_type: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, payload_type, Direction::Output)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Bind the connector directly to a function of another service.
    pub fn with_target(
        mut self,
        service_id: impl Into<String>,
        function: Option<String>,
    ) -> Self {
        self.target_service = Some(service_id.into());
        self.target_function = function;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn payload_type(&self) -> &str {
        &self.payload_type
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn target_service(&self) -> Option<&str> {
        self.target_service.as_deref()
    }

    pub fn target_function(&self) -> Option<&str> {
        self.target_function.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_constructors_reuse_id_as_name() {
        let input = TypedDataConnector::input("int1", "Rec1");
        assert_eq!(input.name(), "int1");
        assert_eq!(input.direction(), Direction::Input);
        assert_eq!(TypedDataConnector::output("int1", "Rec1").direction(), Direction::Output);
    }

    #[test]
    fn target_binding_is_optional() {
        let connector = TypedDataConnector::new("cmd", "Command", "String", Direction::Input)
            .with_description("operator commands")
            .with_target("Start", Some("onCommand".to_owned()));
        assert_eq!(connector.description(), "operator commands");
        assert_eq!(connector.payload_type(), "String");
        assert_eq!(connector.target_service(), Some("Start"));
        assert_eq!(connector.target_function(), Some("onCommand"));
        assert_eq!(TypedDataConnector::input("x", "T").target_service(), None);
    }
}
