//! Routes and the static catalog bookings are made from.

use serde::{Deserialize, Serialize};

/// A bookable route.
///
/// Bookings hold a value copy of the route they were made from, so a route
/// edited or removed from the catalog later never changes an existing
/// booking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Catalog identifier (e.g. `"1"`).
    pub id: String,
    /// Departure point.
    pub from: String,
    /// Destination.
    pub to: String,
    /// Fare in whole rand (ZAR).
    pub price: u32,
    /// Distance in whole kilometres.
    pub distance: u32,
    /// Icon name used by the presentation layer.
    pub icon: String,
}

impl Route {
    /// Build a route with the default `car-arrow-right` icon.
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        price: u32,
        distance: u32,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            price,
            distance,
            icon: DEFAULT_ICON.to_owned(),
        }
    }

    /// List title, e.g. `"Johannesburg to Pretoria"`.
    pub fn title(&self) -> String {
        format!("{} to {}", self.from, self.to)
    }

    /// List subtitle, e.g. `"ZAR 580 - 58 km"`.
    pub fn description(&self) -> String {
        format!("ZAR {} - {} km", self.price, self.distance)
    }
}

const DEFAULT_ICON: &str = "car-arrow-right";

/// Read-only, ordered list of bookable routes.
///
/// # Examples
///
/// ```
/// use ridebook::RouteCatalog;
///
/// let catalog = RouteCatalog::builtin();
/// let route = catalog.get("1").expect("route 1 is built in");
/// assert_eq!(route.title(), "Johannesburg to Pretoria");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteCatalog {
    routes: Vec<Route>,
}

impl RouteCatalog {
    /// Build a catalog from an explicit route list, keeping its order.
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// The four routes the storefront ships with.
    pub fn builtin() -> Self {
        Self::new(vec![
            Route::new("1", "Johannesburg", "Pretoria", 580, 58),
            Route::new("2", "Cape Town", "Stellenbosch", 500, 50),
            Route::new("3", "Durban", "Pietermaritzburg", 780, 78),
            Route::new("4", "Sandton", "Midrand", 180, 18),
        ])
    }

    /// Look up a route by its catalog id.
    pub fn get(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    /// Iterate routes in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// `true` if the catalog has no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RouteCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
