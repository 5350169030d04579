use serde::{Deserialize, Serialize};

/// A catalog product as stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedProduct {
    pub product_id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub effects: Vec<String>,
    pub ingredients: Vec<String>,
    pub price: f64,
    pub image_url: String,
    pub effect_vector: Vec<f32>,
}

/// A normalized catalog record that has not been embedded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub product_id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub effects: Vec<String>,
    pub ingredients: Vec<String>,
    pub price: f64,
    pub image_url: String,
}

impl ProductDraft {
    pub fn with_embedding(self, effect_vector: Vec<f32>) -> IndexedProduct {
        IndexedProduct {
            product_id: self.product_id,
            name: self.name,
            brand: self.brand,
            category: self.category,
            effects: self.effects,
            ingredients: self.ingredients,
            price: self.price,
            image_url: self.image_url,
            effect_vector,
        }
    }
}

/// Store key for a product identifier, e.g. `product:p1`.
pub fn product_key(prefix: &str, product_id: &str) -> String {
    format!("{prefix}{product_id}")
}
