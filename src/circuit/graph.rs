use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Element type produced by an autorouter for each routed connection.
pub const ROUTING_ELEMENT_TYPE: &str = "pcb_trace";

/// A single typed circuit element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitElement {
    /// Discriminant, e.g. `pcb_smtpad` or `pcb_trace`.
    #[serde(rename = "type")]
    pub element_type: String,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CircuitElement {
    /// Creates an element with no fields beyond its type.
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            fields: Map::new(),
        }
    }

    /// Adds a field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Whether this element is a routing (trace) element.
    pub fn is_routing(&self) -> bool {
        self.element_type == ROUTING_ELEMENT_TYPE
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    /// Best identifier for diagnostics: `<type>_id` if present, else the type.
    pub fn label(&self) -> String {
        let id_key = format!("{}_id", self.element_type);
        self.get_str(&id_key)
            .map(str::to_string)
            .unwrap_or_else(|| self.element_type.clone())
    }
}

/// Ordered collection of circuit elements for one rendered design instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitGraph {
    elements: Vec<CircuitElement>,
}

impl CircuitGraph {
    pub fn new(elements: Vec<CircuitElement>) -> Self {
        Self { elements }
    }

    /// Parses a JSON array of typed elements.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parses an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn elements(&self) -> &[CircuitElement] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<CircuitElement> {
        self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterates elements with the given type.
    pub fn elements_of_type<'a>(
        &'a self,
        element_type: &'a str,
    ) -> impl Iterator<Item = &'a CircuitElement> + 'a {
        self.elements
            .iter()
            .filter(move |e| e.element_type == element_type)
    }

    pub fn trace_count(&self) -> usize {
        self.elements.iter().filter(|e| e.is_routing()).count()
    }

    pub fn non_trace_count(&self) -> usize {
        self.elements.len() - self.trace_count()
    }

    /// Count of elements per type, in type-name order.
    pub fn type_histogram(&self) -> BTreeMap<String, usize> {
        let mut histogram = BTreeMap::new();
        for element in &self.elements {
            *histogram.entry(element.element_type.clone()).or_insert(0) += 1;
        }
        histogram
    }

    /// Returns a copy of this graph with all routing elements removed.
    pub fn without_routing(&self) -> Self {
        Self {
            elements: self
                .elements
                .iter()
                .filter(|e| !e.is_routing())
                .cloned()
                .collect(),
        }
    }
}

impl From<Vec<CircuitElement>> for CircuitGraph {
    fn from(elements: Vec<CircuitElement>) -> Self {
        Self::new(elements)
    }
}
