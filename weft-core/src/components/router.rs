//! The Router component: matches a list of `(value_a, operator, value_b)`
//! conditions and stamps a `SelectivePorts` directive naming every matched
//! route, riding the ordinary directive protocol rather than being
//! special-cased by the scheduler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{CanonicalPorts, Component, ComponentError, Directive};
use crate::data::NodeData;
use crate::schema::{PortSchema, PortType, StructuredType};

/// How a route's two values are compared. The original only supports
/// equality (`value_b` defaulting to `value_a` when unset, so an
/// unconditional route always matches); kept as a single-variant enum so
/// the wire shape (`{"operator": "equals", ...}`) can grow without breaking
/// serialized graphs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOperator {
    Equals,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteCondition {
    pub value_a: Value,
    #[serde(default = "default_operator")]
    pub operator: RouteOperator,
    /// Defaults to `value_a` when absent, so a route with only `value_a` set
    /// always matches (an "else"/default route).
    pub value_b: Option<Value>,
}

fn default_operator() -> RouteOperator {
    RouteOperator::Equals
}

impl RouteCondition {
    fn matches(&self) -> bool {
        let value_b = self.value_b.as_ref().unwrap_or(&self.value_a);
        match self.operator {
            RouteOperator::Equals => &self.value_a == value_b,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("no route matched any of {num_routes} configured routes")]
pub struct NoMatchingRouteError {
    pub num_routes: usize,
}

/// Evaluates `routes` in order and halts every downstream edge except those
/// leaving the matched route ports (`route_0`, `route_1`, ...).
pub struct Router {
    id: String,
    routes: Vec<RouteCondition>,
}

impl Router {
    pub fn new(id: impl Into<String>, routes: Vec<RouteCondition>) -> Self {
        Self { id: id.into(), routes }
    }
}

#[async_trait]
impl Component for Router {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_inputs_schema(&self) -> StructuredType {
        StructuredType::new().with_port("input", PortSchema::required(PortType::Json))
    }

    fn get_outputs_schema(&self) -> StructuredType {
        // Downstream ports read the router's own dispatched input via Bypass
        // mappings; the router itself declares no output ports of its own.
        StructuredType::new()
    }

    fn get_canonical_ports(&self) -> CanonicalPorts {
        CanonicalPorts::default()
    }

    async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
        let matched: Vec<String> = self
            .routes
            .iter()
            .enumerate()
            .filter(|(_, route)| route.matches())
            .map(|(i, _)| format!("route_{i}"))
            .collect();

        if matched.is_empty() {
            return Err(ComponentError::execution(
                self.id.clone(),
                NoMatchingRouteError {
                    num_routes: self.routes.len(),
                }
                .to_string(),
            ));
        }

        let mut out = input;
        out = out.with_directive(Directive::selective_ports(matched));
        Ok(out)
    }
}
