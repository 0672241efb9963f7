use std::cmp::Ordering;
use std::collections::HashSet;

use crate::model::{Order, OrderId, Side};

pub const EMPTY_LABEL: &str = "No open orders";
pub const DEFAULT_PAGE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Side,
    Size,
    Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default)]
pub struct TableQuery {
    pub market: Option<String>,
    pub sort: Option<(SortColumn, SortOrder)>,
    pub page: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub order_id: OrderId,
    pub market_name: String,
    pub side: Side,
    pub side_label: &'static str,
    pub size: f64,
    pub price: f64,
    pub busy: bool,
}

#[derive(Debug, Clone)]
pub struct OpenOrderTable {
    orders: Vec<Order>,
    page_size: usize,
}

impl Default for OpenOrderTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn compare(column: SortColumn, a: &Order, b: &Order) -> Ordering {
    match column {
        // sells sort ahead of buys
        SortColumn::Side => match (a.side, b.side) {
            (x, y) if x == y => Ordering::Equal,
            (Side::Buy, _) => Ordering::Greater,
            _ => Ordering::Less,
        },
        SortColumn::Size => b.size.partial_cmp(&a.size).unwrap_or(Ordering::Equal),
        SortColumn::Price => b.price.partial_cmp(&a.price).unwrap_or(Ordering::Equal),
    }
}

impl OpenOrderTable {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            orders,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn set_orders(&mut self, orders: Vec<Order>) {
        self.orders = orders;
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn find(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.order_id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self, query: &TableQuery) -> usize {
        let n = self.filtered(query).count();
        n.div_ceil(self.page_size)
    }

    /// Distinct market names in first-seen order.
    pub fn market_filters(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.orders
            .iter()
            .filter(|o| seen.insert(o.market_name.as_str()))
            .map(|o| o.market_name.clone())
            .collect()
    }

    fn filtered<'a>(&'a self, query: &'a TableQuery) -> impl Iterator<Item = &'a Order> + 'a {
        self.orders.iter().filter(move |o| match &query.market {
            Some(m) => o.market_name.starts_with(m.as_str()),
            None => true,
        })
    }

    pub fn rows(&self, query: &TableQuery, busy: &HashSet<OrderId>) -> Vec<OrderRow> {
        let mut selected: Vec<&Order> = self.filtered(query).collect();
        if let Some((column, order)) = query.sort {
            selected.sort_by(|a, b| {
                let ord = compare(column, a, b);
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
        }
        selected
            .into_iter()
            .skip(query.page * self.page_size)
            .take(self.page_size)
            .map(|o| OrderRow {
                order_id: o.order_id,
                market_name: o.market_name.clone(),
                side: o.side,
                side_label: o.side.label(),
                size: o.size,
                price: o.price,
                busy: busy.contains(&o.order_id),
            })
            .collect()
    }
}
