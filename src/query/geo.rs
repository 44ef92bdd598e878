//! Geo verbs
//!
//! A geo point is one scalar row in the `g:` tag range holding
//! `<latitude>:<longitude>` in decimal degrees. Distance is the great-circle
//! haversine formula over a spherical Earth.

use crate::error::Access;
use crate::keys;
use crate::registry::DbRef;

use super::keys_verbs::{pattern_of, scan_prefix, write_failed};
use super::scan::{run_scan, Emit, FilterOn, Scan};
use super::{Query, RunCtx, Verb};

/// Mean Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

pub(super) fn run(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    match q.verb {
        Verb::GeoAdd => add(q, db),
        Verb::GeoGet => get(q, db),
        Verb::GeoDel => del(q, db),
        Verb::GeoCalc => calc(q, db),
        Verb::GeoFind => listing(q, ctx, db, Emit::Pairs),
        Verb::GeoKeys => listing(q, ctx, db, Emit::Keys),
        _ => Access::Broken,
    }
}

/// Parse `lat:lon`, enforcing coordinate ranges
fn parse_point(text: &str) -> Option<(f64, f64)> {
    let (lat, lon) = text.split_once(':')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some((lat, lon))
}

fn add(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    let Some((lat, lon)) = parse_point(&q.value) else {
        return Access::NotNumeric;
    };
    let row = keys::encode(q.tag(), q.namespace, &q.key, None);
    let stored = format!("{lat}:{lon}");
    match db.engine().put(&row, stored.as_bytes()) {
        Ok(()) => Access::Ok,
        Err(err) => write_failed(q, err),
    }
}

fn get(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    let row = keys::encode(q.tag(), q.namespace, &q.key, None);
    match db.engine().get(&row) {
        Some(value) => {
            q.response = Some(String::from_utf8_lossy(&value).into_owned());
            Access::Ok
        }
        None => Access::NotFound,
    }
}

fn del(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    let row = keys::encode(q.tag(), q.namespace, &q.key, None);
    match db.engine().delete(&row) {
        Ok(true) => Access::Ok,
        Ok(false) => Access::NotFound,
        Err(err) => write_failed(q, err),
    }
}

fn calc(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() || q.new_key.is_empty() {
        return Access::MissingArgs;
    }
    let a_row = keys::encode(q.tag(), q.namespace, &q.key, None);
    let b_row = keys::encode(q.tag(), q.namespace, &q.new_key, None);
    let Some(a) = db.engine().get(&a_row) else {
        return Access::NotFound;
    };
    let Some(b) = db.engine().get(&b_row) else {
        return Access::NotFound;
    };
    let a = parse_point(&String::from_utf8_lossy(&a));
    let b = parse_point(&String::from_utf8_lossy(&b));
    let (Some(a), Some(b)) = (a, b) else {
        return Access::NotNumeric;
    };
    let distance = haversine_distance(a.0, a.1, b.0, b.1);
    q.response = Some(format!("{distance:.4}"));
    Access::Ok
}

/// Great-circle distance in kilometers between two points in degrees
fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

fn listing(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef, emit: Emit) -> Access {
    let scan = Scan {
        prefix: scan_prefix(q),
        tag: q.tag(),
        namespace: q.namespace,
        pattern: pattern_of(q),
        filter_on: FilterOn::Key,
        emit,
        dedup_keys: false,
    };
    run_scan(q, ctx, db, scan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // Paris to London, roughly 344 km
        let d = haversine_distance(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((d - 344.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert_eq!(haversine_distance(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn parse_point_rejects_out_of_range() {
        assert!(parse_point("91:0").is_none());
        assert!(parse_point("0:181").is_none());
        assert!(parse_point("abc:0").is_none());
        assert_eq!(parse_point("-45.5:120.25"), Some((-45.5, 120.25)));
    }
}
