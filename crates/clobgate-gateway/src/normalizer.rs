//! Request normalizer: one canonical shape for every caller operation.
//!
//! Singular and plural fields collapse into a [`Selection`]; neither means
//! "everything in scope". Only request-shape problems are caught here, and
//! they fail the whole call. Market existence and tick/lot alignment are
//! per-entity checks made later against resolved markets.
//!
//! No network side effects.

use std::collections::HashSet;

use clobgate_types::{
    Address, CancelRequest, ClientOrderId, GatewayError, OrderRequest, Result, Selection,
};
use rust_decimal::Decimal;

use crate::request::{
    CancelOrdersRequest, CreateOrdersRequest, MarketsRequest, NewOrder, OrderRef, OrdersQuery,
    OwnerMarketsRequest,
};

/// Owner, market scope and client-id filter of an order query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdersScope {
    pub owner: Address,
    pub markets: Selection<String>,
    pub client_ids: Selection<ClientOrderId>,
}

/// Collapse a singular/plural pair.
///
/// - neither present: [`Selection::All`]
/// - both present: the collection wins if it contains the singular value
/// - an empty collection is never a valid way to say "all"
pub fn selection<T: PartialEq>(
    field: &str,
    single: Option<T>,
    many: Option<Vec<T>>,
) -> Result<Selection<T>> {
    match (single, many) {
        (None, None) => Ok(Selection::All),
        (Some(one), None) => Ok(Selection::Only(vec![one])),
        (_, Some(many)) if many.is_empty() => Err(GatewayError::shape(format!(
            "{field}s must not be empty"
        ))),
        (None, Some(many)) => Ok(Selection::Only(many)),
        (Some(one), Some(many)) => {
            if many.contains(&one) {
                Ok(Selection::Only(many))
            } else {
                Err(GatewayError::shape(format!(
                    "{field} conflicts with {field}s"
                )))
            }
        }
    }
}

/// The owner is mandatory for every owner-scoped operation.
pub fn require_owner(owner: Option<&Address>) -> Result<Address> {
    match owner {
        Some(owner) if !owner.as_str().trim().is_empty() => Ok(owner.clone()),
        Some(_) => Err(GatewayError::shape("owner must not be blank")),
        None => Err(GatewayError::shape("owner is required")),
    }
}

pub fn markets(req: &MarketsRequest) -> Result<Selection<String>> {
    market_selection(req.market_name.clone(), req.market_names.clone())
}

pub fn owner_markets(req: &OwnerMarketsRequest) -> Result<(Address, Selection<String>)> {
    let owner = require_owner(req.owner.as_ref())?;
    let markets = market_selection(req.market_name.clone(), req.market_names.clone())?;
    Ok((owner, markets))
}

pub fn orders_scope(req: &OrdersQuery) -> Result<OrdersScope> {
    let owner = require_owner(req.owner.as_ref())?;
    let markets = market_selection(req.market_name.clone(), req.market_names.clone())?;
    let client_ids = selection("clientId", req.client_id.clone(), req.client_ids.clone())?;
    if let Some(ids) = client_ids.items() {
        if ids.iter().any(ClientOrderId::is_blank) {
            return Err(GatewayError::shape("clientId must not be blank"));
        }
    }
    Ok(OrdersScope {
        owner,
        markets,
        client_ids,
    })
}

/// Canonical place requests, in caller order.
pub fn create_orders(req: &CreateOrdersRequest) -> Result<(Address, Vec<OrderRequest>)> {
    let owner = require_owner(req.owner.as_ref())?;
    let Selection::Only(orders) = selection("order", req.order.clone(), req.orders.clone())?
    else {
        return Err(GatewayError::shape("order or orders is required"));
    };

    let mut seen = HashSet::new();
    let mut requests = Vec::with_capacity(orders.len());
    for order in orders {
        validate_new_order(&order)?;
        if !seen.insert(order.client_id.clone()) {
            return Err(GatewayError::shape(format!(
                "duplicate clientId in request: {}",
                order.client_id
            )));
        }
        requests.push(OrderRequest {
            client_id: order.client_id,
            market_name: order.market_name,
            payer: order.payer.unwrap_or_else(|| owner.clone()),
            owner: owner.clone(),
            side: order.side,
            order_type: order.order_type,
            price: order.price,
            amount: order.amount,
        });
    }
    Ok((owner, requests))
}

/// Canonical cancel requests, in caller order.
pub fn cancel_orders(req: &CancelOrdersRequest) -> Result<(Address, Vec<CancelRequest>)> {
    let owner = require_owner(req.owner.as_ref())?;
    let Selection::Only(refs) = selection("order", req.order.clone(), req.orders.clone())? else {
        return Err(GatewayError::shape(
            "order or orders is required; use cancel_open_orders to cancel everything",
        ));
    };

    let mut seen = HashSet::new();
    let mut requests = Vec::with_capacity(refs.len());
    for r in refs {
        validate_order_ref(&r)?;
        if !seen.insert((r.market_name.clone(), r.client_id.clone())) {
            return Err(GatewayError::shape(format!(
                "duplicate clientId in request: {}",
                r.client_id
            )));
        }
        requests.push(CancelRequest {
            client_id: r.client_id,
            market_name: r.market_name,
            owner: owner.clone(),
            exchange_id: r.exchange_id,
        });
    }
    Ok((owner, requests))
}

fn market_selection(
    single: Option<String>,
    many: Option<Vec<String>>,
) -> Result<Selection<String>> {
    let markets = selection("marketName", single, many)?;
    if let Some(names) = markets.items() {
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(GatewayError::shape("marketName must not be blank"));
        }
    }
    Ok(markets)
}

fn validate_new_order(order: &NewOrder) -> Result<()> {
    if order.client_id.is_blank() {
        return Err(GatewayError::shape("clientId must not be blank"));
    }
    if order.market_name.trim().is_empty() {
        return Err(GatewayError::shape(format!(
            "order {}: marketName must not be blank",
            order.client_id
        )));
    }
    if order.price <= Decimal::ZERO {
        return Err(GatewayError::shape(format!(
            "order {}: price must be positive",
            order.client_id
        )));
    }
    if order.amount <= Decimal::ZERO {
        return Err(GatewayError::shape(format!(
            "order {}: amount must be positive",
            order.client_id
        )));
    }
    Ok(())
}

fn validate_order_ref(r: &OrderRef) -> Result<()> {
    if r.client_id.is_blank() {
        return Err(GatewayError::shape("clientId must not be blank"));
    }
    if r.market_name.trim().is_empty() {
        return Err(GatewayError::shape(format!(
            "order {}: marketName must not be blank",
            r.client_id
        )));
    }
    Ok(())
}
