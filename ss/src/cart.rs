//! Smart cart: price a shopping list against past receipts

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

use crate::error::StoreError;
use crate::store::SpendStore;

/// One product and the quantity to buy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Matches `invoices.full_product_name`
    pub product: String,
    pub quantity: f64,
}

impl CartItem {
    pub fn new(product: impl Into<String>, quantity: f64) -> Self {
        Self {
            product: product.into(),
            quantity,
        }
    }
}

/// Parses `<product>=<quantity>`; the product name may itself contain `=`
impl FromStr for CartItem {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (product, qty) = s
            .rsplit_once('=')
            .ok_or_else(|| StoreError::InvalidCartItem(s.to_string()))?;
        let product = product.trim();
        let quantity: f64 = qty
            .trim()
            .replace(',', ".")
            .parse()
            .map_err(|_| StoreError::InvalidCartItem(s.to_string()))?;
        if product.is_empty() || !quantity.is_finite() {
            return Err(StoreError::InvalidCartItem(s.to_string()));
        }
        Ok(Self::new(product, quantity))
    }
}

/// Most recent unit price of a product at one supermarket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub supermarket: String,
    pub product: String,
    pub unitary_value: f64,
    pub datetime: String,
}

/// Estimated cost of the whole cart at one supermarket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupermarketTotal {
    pub supermarket: String,
    pub total: f64,
    /// Cart products this supermarket has no price for
    pub missing: Vec<String>,
}

/// Cheapest known source for one cart item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheapestLine {
    pub product: String,
    pub quantity: f64,
    pub supermarket: String,
    pub unitary_value: f64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartQuote {
    /// Ascending by total
    pub per_supermarket: Vec<SupermarketTotal>,
    /// Best price per item across supermarkets
    pub cheapest: Vec<CheapestLine>,
    pub cheapest_total: f64,
    /// Cart products never seen on any receipt
    pub unpriced: Vec<String>,
}

/// Price a cart against a list of latest prices
///
/// Items with a non-positive quantity are ignored.
pub fn quote(items: &[CartItem], prices: &[PricePoint]) -> CartQuote {
    let items: Vec<&CartItem> = items.iter().filter(|i| i.quantity > 0.0).collect();

    let mut supermarkets: Vec<&str> = Vec::new();
    for p in prices {
        if !supermarkets.contains(&p.supermarket.as_str()) {
            supermarkets.push(&p.supermarket);
        }
    }

    let mut per_supermarket = Vec::new();
    for market in supermarkets {
        let mut total = 0.0;
        let mut missing = Vec::new();
        let mut priced_any = false;
        for item in &items {
            match prices
                .iter()
                .find(|p| p.supermarket == market && p.product == item.product)
            {
                Some(p) => {
                    total += item.quantity * p.unitary_value;
                    priced_any = true;
                }
                None => missing.push(item.product.clone()),
            }
        }
        if priced_any {
            per_supermarket.push(SupermarketTotal {
                supermarket: market.to_string(),
                total,
                missing,
            });
        }
    }
    per_supermarket.sort_by(|a, b| a.total.total_cmp(&b.total));

    let mut cheapest = Vec::new();
    let mut unpriced = Vec::new();
    for item in &items {
        let best = prices
            .iter()
            .filter(|p| p.product == item.product)
            .min_by(|a, b| a.unitary_value.total_cmp(&b.unitary_value));
        match best {
            Some(p) => cheapest.push(CheapestLine {
                product: item.product.clone(),
                quantity: item.quantity,
                supermarket: p.supermarket.clone(),
                unitary_value: p.unitary_value,
                estimated_cost: item.quantity * p.unitary_value,
            }),
            None => unpriced.push(item.product.clone()),
        }
    }
    let cheapest_total = cheapest.iter().map(|l| l.estimated_cost).sum();

    CartQuote {
        per_supermarket,
        cheapest,
        cheapest_total,
        unpriced,
    }
}

impl SpendStore {
    /// Latest unit price per (supermarket, product), newest receipts first
    pub fn latest_prices(&self) -> Result<Vec<PricePoint>, StoreError> {
        debug!("latest_prices: called");
        let mut stmt = self.connection().prepare(
            "SELECT supermarket_name, full_product_name, unitary_value, datetime FROM invoices \
             WHERE full_product_name IS NOT NULL ORDER BY datetime DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PricePoint {
                    supermarket: row.get(0)?,
                    product: row.get(1)?,
                    unitary_value: row.get(2)?,
                    datetime: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let latest: Vec<PricePoint> = rows
            .into_iter()
            .filter(|p| seen.insert((p.supermarket.clone(), p.product.clone())))
            .collect();
        debug!(count = latest.len(), "latest_prices: done");
        Ok(latest)
    }

    /// Distinct product names available for a cart, sorted
    pub fn cart_products(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.connection().prepare(
            "SELECT DISTINCT full_product_name FROM invoices WHERE full_product_name IS NOT NULL ORDER BY full_product_name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Price a cart using the latest known prices
    pub fn price_cart(&self, items: &[CartItem]) -> Result<CartQuote, StoreError> {
        debug!(items = items.len(), "price_cart: called");
        let prices = self.latest_prices()?;
        Ok(quote(items, &prices))
    }
}
