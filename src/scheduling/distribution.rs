use super::warehouse::Warehouse;
use crate::error::SchedulingError;
use crate::model::graph::NodeId;
use crate::model::request::{RequestBook, RequestId};

/// Which end of a request decides its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Pickup,
    Place,
}

/// Split a batch over `vehicle_count` vehicles.
///
/// Requests are grouped by their pickup or place node. The busiest groups go
/// first, and each group goes whole to the next vehicle holding fewer than
/// `ceil(batch / vehicles) + 1` requests. Groups of equal size keep the order
/// in which they first appear in the batch.
pub fn plan_distribution(
    batch: &[RequestId],
    requests: &RequestBook,
    side: GroupBy,
    vehicle_count: usize,
) -> Result<Vec<Vec<RequestId>>, SchedulingError> {
    if batch.is_empty() {
        return Ok(vec![Vec::new(); vehicle_count]);
    }
    if vehicle_count == 0 {
        return Err(SchedulingError::NoVehicles {
            requests: batch.len(),
        });
    }

    let mut groups: Vec<(NodeId, Vec<RequestId>)> = Vec::new();
    for id in batch {
        let request = &requests[*id];
        let key = match side {
            GroupBy::Pickup => request.pickup,
            GroupBy::Place => request.place,
        };
        match groups.iter_mut().find(|(node, _)| *node == key) {
            Some((_, members)) => members.push(*id),
            None => groups.push((key, vec![*id])),
        }
    }
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let limit = (batch.len() + vehicle_count - 1) / vehicle_count + 1;
    let mut plan = vec![Vec::new(); vehicle_count];
    let mut cursor = 0;
    for (_, members) in groups {
        let mut skipped = 0;
        while plan[cursor].len() >= limit && skipped < vehicle_count {
            cursor = (cursor + 1) % vehicle_count;
            skipped += 1;
        }
        plan[cursor].extend(members);
        cursor = (cursor + 1) % vehicle_count;
    }
    Ok(plan)
}

/// Hand each vehicle its share and let it claim the stacks involved.
pub fn apply_distribution(wh: &mut Warehouse, plan: Vec<Vec<RequestId>>) {
    for (vehicle, share) in wh.vehicles.iter_mut().zip(plan) {
        for id in &share {
            let request = &wh.requests[*id];
            for node in [request.pickup, request.place] {
                if let Some(stack) = wh.graph.node(node).stack_id() {
                    vehicle.claim_stack(stack);
                }
            }
        }
        vehicle.assign(share);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::request::Request;
    use crate::scheduling::warehouse::fixtures::{node, warehouse};

    fn book(specs: &[(RequestId, NodeId, NodeId)]) -> RequestBook {
        let mut book = RequestBook::new();
        for (id, pickup, place) in specs {
            book.insert(Request::new(*id, *pickup, *place, &format!("b{}", id)))
                .unwrap();
        }
        book
    }

    #[test]
    fn every_request_is_assigned_once() {
        let book = book(&[(1, 0, 9), (2, 0, 9), (3, 1, 9), (4, 2, 9), (5, 1, 9)]);
        let batch = vec![1, 2, 3, 4, 5];
        let plan = plan_distribution(&batch, &book, GroupBy::Pickup, 2).unwrap();

        let mut all: Vec<_> = plan.iter().flatten().copied().collect();
        all.sort();
        assert_eq!(all, batch);
    }

    #[test]
    fn busiest_group_goes_first_and_ties_keep_order() {
        let book = book(&[(1, 0, 9), (2, 1, 9), (3, 1, 9), (4, 2, 9)]);
        let plan = plan_distribution(&[1, 2, 3, 4], &book, GroupBy::Pickup, 3).unwrap();
        assert_eq!(plan, vec![vec![2, 3], vec![1], vec![4]]);
    }

    #[test]
    fn saturated_vehicles_are_skipped() {
        // limit = ceil(6 / 2) + 1 = 4
        let book = book(&[(1, 0, 9), (2, 0, 9), (3, 0, 9), (4, 0, 9), (5, 1, 9), (6, 2, 9)]);
        let plan = plan_distribution(&[1, 2, 3, 4, 5, 6], &book, GroupBy::Pickup, 2).unwrap();
        assert_eq!(plan, vec![vec![1, 2, 3, 4], vec![5, 6]]);
    }

    #[test]
    fn groups_by_place_when_asked() {
        let book = book(&[(1, 5, 0), (2, 6, 0), (3, 7, 1)]);
        let plan = plan_distribution(&[1, 2, 3], &book, GroupBy::Place, 2).unwrap();
        assert_eq!(plan, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn no_vehicles_is_an_error_only_with_work() {
        let book = book(&[(1, 0, 9)]);
        assert!(plan_distribution(&[], &book, GroupBy::Pickup, 0).is_ok());
        assert_eq!(
            plan_distribution(&[1], &book, GroupBy::Pickup, 0),
            Err(SchedulingError::NoVehicles { requests: 1 })
        );
    }

    #[test]
    fn applying_claims_stacks() {
        let mut wh = warehouse(&[("A", 3, "b1"), ("B", 3, "")], &[2]);
        let (a, b) = (node(&wh, "A"), node(&wh, "B"));
        wh.add_request(Request::new(1, a, b, "b1")).unwrap();
        apply_distribution(&mut wh, vec![vec![1]]);

        assert_eq!(wh.vehicles[0].assigned, vec![1]);
        assert_eq!(wh.vehicles[0].my_stacks(), &[1, 2]);
    }
}
