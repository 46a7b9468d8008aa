use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::Serialize;
use serde_json::{json, Value};

/// The operations the model may ask the agent to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    GetProducts,
    SearchProducts,
    GetProductDetails,
    PlaceOrder,
}

impl ToolName {
    pub const ALL: [ToolName; 4] =
        [Self::GetProducts, Self::SearchProducts, Self::GetProductDetails, Self::PlaceOrder];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetProducts => "get_products",
            Self::SearchProducts => "search_products",
            Self::GetProductDetails => "get_product_details",
            Self::PlaceOrder => "place_order",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownToolName(pub String);

impl FromStr for ToolName {
    type Err = UnknownToolName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == value)
            .ok_or_else(|| UnknownToolName(value.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Debug)]
pub struct ToolRegistry {
    descriptors: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    /// Process-wide registry; every caller sees the same descriptors.
    pub fn standard() -> &'static ToolRegistry {
        static REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| ToolRegistry { descriptors: standard_descriptors() })
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.iter().any(|descriptor| descriptor.name == name)
    }
}

fn standard_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: ToolName::GetProducts.as_str(),
            description: "List every product in the store catalog with id, name, price, \
                          description and category.",
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        },
        ToolDescriptor {
            name: ToolName::SearchProducts.as_str(),
            description: "Search the catalog by product name or category (case-insensitive).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Text to match against product names and categories"
                    }
                },
                "required": ["query"]
            }),
        },
        ToolDescriptor {
            name: ToolName::GetProductDetails.as_str(),
            description: "Get the full details of a single product by its numeric id.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "product_id": {
                        "type": "integer",
                        "description": "The product id"
                    }
                },
                "required": ["product_id"]
            }),
        },
        ToolDescriptor {
            name: ToolName::PlaceOrder.as_str(),
            description: "Place an order for one or more products. Only call this after the \
                          customer confirmed the items and quantities.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "items": {
                        "type": "array",
                        "description": "Products to order",
                        "items": {
                            "type": "object",
                            "properties": {
                                "product_id": { "type": "integer" },
                                "quantity": { "type": "integer", "minimum": 1 }
                            },
                            "required": ["product_id", "quantity"]
                        }
                    },
                    "customer_email": {
                        "type": "string",
                        "description": "Optional email address for the order confirmation"
                    }
                },
                "required": ["items"]
            }),
        },
    ]
}
