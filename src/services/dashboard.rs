//! Admin dashboard aggregations.
//!
//! Everything here is computed from full collection scans. Revenue only
//! counts settled (`completed` or `fulfilled`) orders.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::product::SALES;
use crate::domain::aggregates::{Category, Order, Product, Role, User};
use crate::domain::value_objects::Sku;
use crate::error::Result;
use crate::store::{timestamp, Collection, Direction, DocumentStore, FilterOp, Query, CREATED_AT};

const RECENT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub products: u64,
    pub orders: u64,
    pub users: u64,
    pub categories: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Revenue {
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub counts: Counts,
    pub revenue: Revenue,
    pub recent_orders: Vec<Order>,
    pub top_products: Vec<Product>,
    pub recent_users: Vec<User>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalesPeriod {
    /// Last 7 days.
    Week,
    /// Since the first of the current month.
    Month,
    /// Since January 1st.
    Year,
    /// Last 30 days, when no period is given.
    Last30Days,
}

impl SalesPeriod {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("week") => Self::Week,
            Some("month") => Self::Month,
            Some("year") => Self::Year,
            _ => Self::Last30Days,
        }
    }

    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Week => now - Duration::days(7),
            Self::Month => month_start(now),
            Self::Year => Utc.with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0).single().unwrap_or(now),
            Self::Last30Days => now - Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub revenue: Decimal,
}

impl Tally {
    fn add(&mut self, count: u64, revenue: Decimal) {
        self.count += count;
        self.revenue = self.revenue.saturating_add(revenue);
    }
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesAnalytics {
    pub period: Option<String>,
    pub sales_by_day: BTreeMap<String, Tally>,
    pub sales_by_category: BTreeMap<String, Tally>,
    pub sales_by_payment_method: BTreeMap<String, Tally>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn classify(product: &Product, low_threshold: i64) -> Self {
        if !product.is_in_stock() {
            Self::OutOfStock
        } else if product.inventory < low_threshold {
            Self::LowStock
        } else {
            Self::InStock
        }
    }
}

#[derive(Debug, PartialEq, Serialize)]
pub struct StockLine {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    pub inventory: i64,
    pub status: StockStatus,
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReport {
    pub total: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub products: Vec<StockLine>,
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAnalytics {
    pub total: usize,
    pub new_this_month: usize,
    pub roles: BTreeMap<&'static str, usize>,
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0).single().unwrap_or(now)
}

fn placed_since(order: &Order, since: DateTime<Utc>) -> bool {
    order.created_at.is_some_and(|at| at >= since)
}

pub fn revenue(orders: &[Order], now: DateTime<Utc>) -> Revenue {
    let since = month_start(now);
    orders.iter().filter(|o| o.status.is_settled()).fold(Revenue::default(), |mut acc, order| {
        acc.total = acc.total.saturating_add(order.total);
        if placed_since(order, since) {
            acc.monthly = acc.monthly.saturating_add(order.total);
        }
        acc
    })
}

pub fn sales_analytics(orders: &[Order], period: Option<&str>, now: DateTime<Utc>) -> SalesAnalytics {
    let since = SalesPeriod::parse(period).start(now);
    let mut analytics = SalesAnalytics { period: period.map(str::to_string), ..Default::default() };

    for order in orders.iter().filter(|o| o.status.is_settled()) {
        let Some(placed) = order.created_at.filter(|at| *at >= since) else {
            continue;
        };
        let day = placed.format("%Y-%m-%d").to_string();
        analytics.sales_by_day.entry(day).or_default().add(1, order.total);

        let method = order.payment_method.clone().unwrap_or_else(|| "unknown".to_string());
        analytics.sales_by_payment_method.entry(method).or_default().add(1, order.total);

        for item in &order.items {
            if let Some(category) = &item.category {
                analytics
                    .sales_by_category
                    .entry(category.clone())
                    .or_default()
                    .add(u64::from(item.quantity), item.line_total().unwrap_or(Decimal::MAX));
            }
        }
    }
    analytics
}

pub fn inventory_report(products: Vec<Product>, low_threshold: i64) -> InventoryReport {
    let mut report = InventoryReport { total: products.len(), ..Default::default() };
    for product in products {
        let status = StockStatus::classify(&product, low_threshold);
        match status {
            StockStatus::OutOfStock => report.out_of_stock += 1,
            StockStatus::LowStock => report.low_stock += 1,
            StockStatus::InStock => {}
        }
        report.products.push(StockLine {
            id: product.id,
            name: product.name,
            sku: product.sku,
            inventory: product.inventory,
            status,
        });
    }
    report
}

pub fn user_analytics(users: &[User], now: DateTime<Utc>) -> UserAnalytics {
    let since = now - Duration::days(30);
    let mut roles = BTreeMap::from([
        (Role::Admin.as_str(), 0),
        (Role::Manager.as_str(), 0),
        (Role::Customer.as_str(), 0),
    ]);
    for user in users {
        *roles.entry(user.role.as_str()).or_default() += 1;
    }
    UserAnalytics {
        total: users.len(),
        new_this_month: users.iter().filter(|u| u.created_at.is_some_and(|at| at >= since)).count(),
        roles,
    }
}

/// Loads the collections the dashboard reads.
#[derive(Clone)]
pub struct DashboardService {
    products: Collection<Product>,
    orders: Collection<Order>,
    users: Collection<User>,
    categories: Collection<Category>,
    low_stock_threshold: i64,
}

impl DashboardService {
    pub fn new(store: Arc<dyn DocumentStore>, low_stock_threshold: i64) -> Self {
        Self {
            products: Collection::new(store.clone()),
            orders: Collection::new(store.clone()),
            users: Collection::new(store.clone()),
            categories: Collection::new(store),
            low_stock_threshold,
        }
    }

    pub async fn overview(&self, now: DateTime<Utc>) -> Result<Overview> {
        let orders = self.orders.all().await?;
        let newest = |limit| Query::new().order_by(CREATED_AT, Direction::Desc).limit(limit);
        Ok(Overview {
            counts: Counts {
                products: self.products.count().await?,
                orders: orders.len() as u64,
                users: self.users.count().await?,
                categories: self.categories.count().await?,
            },
            revenue: revenue(&orders, now),
            recent_orders: self.orders.query(&newest(RECENT)).await?,
            top_products: self.products.query(&Query::new().order_by(SALES, Direction::Desc).limit(RECENT)).await?,
            recent_users: self.users.query(&newest(RECENT)).await?,
        })
    }

    pub async fn sales(&self, period: Option<&str>, now: DateTime<Utc>) -> Result<SalesAnalytics> {
        let since = SalesPeriod::parse(period).start(now);
        let query = Query::new()
            .filter(CREATED_AT, FilterOp::Ge, timestamp(since))
            .order_by(CREATED_AT, Direction::Asc);
        let orders = self.orders.query(&query).await?;
        Ok(sales_analytics(&orders, period, now))
    }

    pub async fn inventory(&self) -> Result<InventoryReport> {
        Ok(inventory_report(self.products.all().await?, self.low_stock_threshold))
    }

    pub async fn users(&self, now: DateTime<Utc>) -> Result<UserAnalytics> {
        Ok(user_analytics(&self.users.all().await?, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderItem, OrderStatus};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn order(total: i64, status: OrderStatus, placed: &str, method: Option<&str>) -> Order {
        let item = OrderItem {
            product_id: "p1".into(),
            name: "Mug".into(),
            price: Decimal::from(total),
            quantity: 1,
            category: Some("kitchen".into()),
        };
        let mut order = Order::create("u1", vec![item], Decimal::ZERO, Decimal::ZERO).unwrap();
        order.status = status;
        order.payment_method = method.map(str::to_string);
        order.created_at = Some(at(placed));
        order
    }

    #[test]
    fn test_revenue_counts_settled_orders() {
        let now = at("2026-03-15T12:00:00Z");
        let orders = vec![
            order(100, OrderStatus::Completed, "2026-03-02T00:00:00Z", None),
            order(50, OrderStatus::Fulfilled, "2026-02-20T00:00:00Z", None),
            order(999, OrderStatus::Pending, "2026-03-10T00:00:00Z", None),
        ];
        let revenue = revenue(&orders, now);
        assert_eq!(revenue.total, Decimal::from(150));
        assert_eq!(revenue.monthly, Decimal::from(100));
    }

    #[test]
    fn test_period_start() {
        let now = at("2026-03-15T12:00:00Z");
        assert_eq!(SalesPeriod::parse(Some("week")).start(now), at("2026-03-08T12:00:00Z"));
        assert_eq!(SalesPeriod::parse(Some("month")).start(now), at("2026-03-01T00:00:00Z"));
        assert_eq!(SalesPeriod::parse(Some("year")).start(now), at("2026-01-01T00:00:00Z"));
        assert_eq!(SalesPeriod::parse(None).start(now), at("2026-02-13T12:00:00Z"));
    }

    #[test]
    fn test_sales_analytics_groups() {
        let now = at("2026-03-15T12:00:00Z");
        let orders = vec![
            order(100, OrderStatus::Completed, "2026-03-14T09:00:00Z", Some("stripe")),
            order(40, OrderStatus::Completed, "2026-03-14T18:00:00Z", None),
            order(70, OrderStatus::Cancelled, "2026-03-14T18:00:00Z", Some("stripe")),
            order(10, OrderStatus::Completed, "2026-01-01T00:00:00Z", Some("stripe")),
        ];
        let analytics = sales_analytics(&orders, Some("week"), now);
        assert_eq!(analytics.sales_by_day["2026-03-14"], Tally { count: 2, revenue: Decimal::from(140) });
        assert_eq!(analytics.sales_by_payment_method["stripe"], Tally { count: 1, revenue: Decimal::from(100) });
        assert_eq!(analytics.sales_by_payment_method["unknown"].count, 1);
        assert_eq!(analytics.sales_by_category["kitchen"], Tally { count: 2, revenue: Decimal::from(140) });
    }

    #[test]
    fn test_stock_classification() {
        let stocked = |inventory: i64| -> Product {
            serde_json::from_value(serde_json::json!({"name": "Mug", "price": 5, "inventory": inventory})).unwrap()
        };
        assert_eq!(StockStatus::classify(&stocked(-2), 10), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(&stocked(0), 10), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(&stocked(9), 10), StockStatus::LowStock);
        assert_eq!(StockStatus::classify(&stocked(10), 10), StockStatus::InStock);
    }

    #[test]
    fn test_user_analytics() {
        let now = at("2026-03-15T12:00:00Z");
        let user = |role, created: &str| User {
            id: String::new(),
            email: "a@b.c".into(),
            display_name: None,
            role,
            phone: None,
            created_at: Some(at(created)),
            updated_at: None,
        };
        let users = vec![
            user(Role::Admin, "2025-01-01T00:00:00Z"),
            user(Role::Customer, "2026-03-01T00:00:00Z"),
            user(Role::Customer, "2026-03-14T00:00:00Z"),
        ];
        let analytics = user_analytics(&users, now);
        assert_eq!(analytics.total, 3);
        assert_eq!(analytics.new_this_month, 2);
        assert_eq!(analytics.roles["customer"], 2);
        assert_eq!(analytics.roles["manager"], 0);
    }
}
