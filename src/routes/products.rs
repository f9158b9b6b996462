use axum::Json;
use strum::IntoEnumIterator;

use crate::models::job::Product;
use crate::models::verification::ProductInfo;

/// GET /products — the supported verification products.
pub async fn list_products() -> Json<Vec<ProductInfo>> {
    Json(
        Product::iter()
            .map(|p| ProductInfo {
                id: p,
                name: p.display_name(),
                description: p.description(),
            })
            .collect(),
    )
}
