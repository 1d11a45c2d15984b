//! Catalog administration: products, models, stock rows and images.

use std::sync::Arc;

use common::{ImageId, ModelId, ProductId, StockId};
use store::{
    CatalogStore, Image, Model, ModelPatch, ModelWithStock, NewModel, NewProduct, NewStock,
    PriceTiers, Product, ProductDetail, ProductPatch, ProductWithModels, Stock,
};

use crate::error::DomainError;
use crate::services::{ImageStorage, ImageUpload};

/// Largest number of units one stock adjustment may add or remove.
pub const MAX_STOCK_ADJUSTMENT: i32 = 1_000_000;

/// Validated pass-through to the catalog store.
#[derive(Clone)]
pub struct CatalogService<S: CatalogStore> {
    store: S,
    images: Arc<dyn ImageStorage>,
}

fn require_name(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_prices(prices: &PriceTiers) -> Result<(), DomainError> {
    let columns = [
        ("cost", prices.cost),
        ("retail", prices.retail),
        ("reseller", prices.reseller),
        ("allied", prices.allied),
        ("promotional", prices.promotional),
    ];
    match columns.iter().find(|(_, price)| price.is_negative()) {
        Some((column, price)) => Err(DomainError::validation(format!(
            "{column} price must not be negative, got {price}"
        ))),
        None => Ok(()),
    }
}

impl<S: CatalogStore> CatalogService<S> {
    pub fn new(store: S, images: Arc<dyn ImageStorage>) -> Self {
        Self { store, images }
    }

    // -- Products --

    #[tracing::instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_product(&self, new: NewProduct) -> Result<Product, DomainError> {
        require_name("name", &new.name)?;
        Ok(self.store.insert_product(new).await?)
    }

    pub async fn list_products(&self) -> Result<Vec<ProductWithModels>, DomainError> {
        Ok(self.store.list_products().await?)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<ProductDetail, DomainError> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", id))
    }

    pub async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, DomainError> {
        if let Some(name) = &patch.name {
            require_name("name", name)?;
        }
        Ok(self.store.update_product(id, patch).await?)
    }

    /// Deletes a product. Fails with `Conflict` while it still has models.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), DomainError> {
        Ok(self.store.delete_product(id).await?)
    }

    // -- Models --

    #[tracing::instrument(skip(self, new), fields(product_id = %new.product_id, name = %new.name))]
    pub async fn create_model(&self, new: NewModel) -> Result<Model, DomainError> {
        require_name("name", &new.name)?;
        require_name("color", &new.color)?;
        require_prices(&new.prices)?;
        Ok(self.store.insert_model(new).await?)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelWithStock>, DomainError> {
        Ok(self.store.list_models().await?)
    }

    pub async fn get_model(&self, id: ModelId) -> Result<Model, DomainError> {
        self.store
            .get_model(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Model", id))
    }

    pub async fn update_model(&self, id: ModelId, patch: ModelPatch) -> Result<Model, DomainError> {
        if let Some(name) = &patch.name {
            require_name("name", name)?;
        }
        if let Some(color) = &patch.color {
            require_name("color", color)?;
        }
        if let Some(prices) = &patch.prices {
            require_prices(prices)?;
        }
        Ok(self.store.update_model(id, patch).await?)
    }

    /// Deletes a model with its stock rows and images. Fails with `Conflict`
    /// while any order item references it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_model(&self, id: ModelId) -> Result<(), DomainError> {
        Ok(self.store.delete_model(id).await?)
    }

    // -- Stocks --

    #[tracing::instrument(skip(self, new), fields(model_id = %new.model_id, size = new.size))]
    pub async fn create_stock(&self, new: NewStock) -> Result<Stock, DomainError> {
        if new.size <= 0 {
            return Err(DomainError::validation(format!(
                "size must be positive, got {}",
                new.size
            )));
        }
        if new.quantity < 0 {
            return Err(DomainError::validation(format!(
                "quantity must not be negative, got {}",
                new.quantity
            )));
        }
        self.get_model(new.model_id).await?;
        Ok(self.store.insert_stock(new).await?)
    }

    pub async fn list_stocks(&self) -> Result<Vec<Stock>, DomainError> {
        Ok(self.store.list_stocks().await?)
    }

    pub async fn get_stock(&self, id: StockId) -> Result<Stock, DomainError> {
        self.store
            .get_stock(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Stock", id))
    }

    /// Adds a signed delta to a stock row. The result may not go below zero.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_stock(&self, id: StockId, delta: i32) -> Result<Stock, DomainError> {
        if delta.unsigned_abs() > MAX_STOCK_ADJUSTMENT.unsigned_abs() {
            return Err(DomainError::validation(format!(
                "quantity adjustment must be within ±{MAX_STOCK_ADJUSTMENT}"
            )));
        }
        let stock = self.store.restock(id, delta).await?;
        tracing::info!(quantity = stock.quantity, "stock adjusted");
        Ok(stock)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_stock(&self, id: StockId) -> Result<(), DomainError> {
        Ok(self.store.delete_stock(id).await?)
    }

    /// Units across every stock row.
    pub async fn stock_total(&self) -> Result<i64, DomainError> {
        Ok(self.store.total_stock_quantity().await?)
    }

    // -- Images --

    /// Uploads every file and records one image row per URL.
    ///
    /// Nothing is recorded unless all uploads succeed.
    #[tracing::instrument(skip(self, uploads), fields(files = uploads.len()))]
    pub async fn upload_images(
        &self,
        model_id: ModelId,
        uploads: Vec<ImageUpload>,
    ) -> Result<Vec<Image>, DomainError> {
        if uploads.is_empty() {
            return Err(DomainError::validation("at least one file is required"));
        }
        for upload in &uploads {
            upload.validate()?;
        }
        self.get_model(model_id).await?;

        let mut urls = Vec::with_capacity(uploads.len());
        for upload in uploads {
            urls.push(self.images.upload(upload).await?);
        }
        Ok(self.store.insert_images(model_id, urls).await?)
    }

    /// Uploads a new file and points an existing image row at it.
    #[tracing::instrument(skip(self, upload))]
    pub async fn replace_image(
        &self,
        id: ImageId,
        upload: ImageUpload,
    ) -> Result<Image, DomainError> {
        upload.validate()?;
        self.get_image(id).await?;
        let url = self.images.upload(upload).await?;
        Ok(self.store.update_image(id, url).await?)
    }

    pub async fn list_images(&self) -> Result<Vec<Image>, DomainError> {
        Ok(self.store.list_images().await?)
    }

    pub async fn get_image(&self, id: ImageId) -> Result<Image, DomainError> {
        self.store
            .get_image(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Image", id))
    }

    pub async fn delete_image(&self, id: ImageId) -> Result<(), DomainError> {
        Ok(self.store.delete_image(id).await?)
    }
}
