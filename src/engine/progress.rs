use crate::engine::lifecycle::LifecycleError;
use crate::models::offer::OfferKind;
use crate::models::trip::{Trip, TripStatus};

/// Statuses a trip of `kind` may move to from `status`.
pub fn allowed_next(kind: OfferKind, status: TripStatus) -> &'static [TripStatus] {
    match (kind, status) {
        (_, TripStatus::Accepted) => &[TripStatus::Arrived, TripStatus::Cancelled],
        (OfferKind::Ride, TripStatus::Arrived) => &[TripStatus::Started, TripStatus::Cancelled],
        (OfferKind::Delivery, TripStatus::Arrived) => {
            &[TripStatus::PickedUp, TripStatus::Cancelled]
        }
        (OfferKind::Ride, TripStatus::Started) | (OfferKind::Delivery, TripStatus::PickedUp) => {
            &[TripStatus::Completed, TripStatus::Cancelled]
        }
        _ => &[],
    }
}

pub fn check_transition(
    trip: &Trip,
    next: TripStatus,
    pin: Option<&str>,
) -> Result<(), LifecycleError> {
    if !allowed_next(trip.kind, trip.status).contains(&next) {
        return Err(LifecycleError::InvalidTransition {
            from: trip.status,
            to: next,
        });
    }

    if trip.kind == OfferKind::Delivery && next == TripStatus::Completed {
        if let Some(expected) = trip.pin.as_deref() {
            match pin.map(str::trim) {
                None | Some("") => return Err(LifecycleError::PinRequired),
                Some(given) if given != expected => return Err(LifecycleError::PinMismatch),
                Some(_) => {}
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{allowed_next, check_transition};
    use crate::engine::lifecycle::LifecycleError;
    use crate::models::driver::GeoPoint;
    use crate::models::offer::{Contact, OfferKind, Waypoint};
    use crate::models::trip::{Trip, TripStatus};

    fn trip(kind: OfferKind, status: TripStatus, pin: Option<&str>) -> Trip {
        let stop = Waypoint {
            address: "Samora Machel Ave".to_string(),
            location: GeoPoint {
                lat: -17.8292,
                lng: 31.0522,
            },
        };
        Trip {
            id: "trip-1".to_string(),
            offer_id: "offer-1".to_string(),
            kind,
            status,
            customer: Contact {
                name: "Rudo".to_string(),
                phone: None,
                rating: None,
            },
            pickup: stop.clone(),
            dropoff: stop,
            fare: 6.5,
            pin: pin.map(str::to_string),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn ride_and_delivery_diverge_after_arrival() {
        assert!(allowed_next(OfferKind::Ride, TripStatus::Arrived).contains(&TripStatus::Started));
        assert!(!allowed_next(OfferKind::Ride, TripStatus::Arrived).contains(&TripStatus::PickedUp));
        assert!(
            allowed_next(OfferKind::Delivery, TripStatus::Arrived).contains(&TripStatus::PickedUp)
        );
    }

    #[test]
    fn terminal_statuses_have_no_successors() {
        for kind in [OfferKind::Ride, OfferKind::Delivery] {
            assert!(allowed_next(kind, TripStatus::Completed).is_empty());
            assert!(allowed_next(kind, TripStatus::Cancelled).is_empty());
        }
    }

    #[test]
    fn skipping_arrival_is_rejected() {
        let current = trip(OfferKind::Ride, TripStatus::Accepted, None);
        let err = check_transition(&current, TripStatus::Started, None).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: TripStatus::Accepted,
                to: TripStatus::Started
            }
        ));
    }

    #[test]
    fn delivery_completion_checks_pin() {
        let current = trip(OfferKind::Delivery, TripStatus::PickedUp, Some("4821"));

        assert!(matches!(
            check_transition(&current, TripStatus::Completed, None),
            Err(LifecycleError::PinRequired)
        ));
        assert!(matches!(
            check_transition(&current, TripStatus::Completed, Some("0000")),
            Err(LifecycleError::PinMismatch)
        ));
        assert!(check_transition(&current, TripStatus::Completed, Some(" 4821 ")).is_ok());
    }

    #[test]
    fn cancelling_needs_no_pin() {
        let current = trip(OfferKind::Delivery, TripStatus::PickedUp, Some("4821"));
        assert!(check_transition(&current, TripStatus::Cancelled, None).is_ok());
    }
}
