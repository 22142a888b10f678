// Copyright 2016 The Cartographer Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::errors::ErrorKind;
use crate::geometry::{Aabb, ConvexHull, Plane, Sphere, Volume};
use crate::math::Relation;
use crate::octree::{BulkLoader, BulkStrategy, EntityId, Octree, Options};
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn small_octree(node_capacity: usize, max_level: u8) -> Octree<&'static str> {
    Octree::new(Options {
        node_capacity,
        max_level,
        ..Default::default()
    })
    .unwrap()
}

/// Both halves of the entity ↔ node relation must mirror each other.
fn assert_relation_symmetric<C>(octree: &Octree<C>) {
    let state = octree.read_state();
    for (id, entity) in state.entities.iter() {
        for key in entity.locations() {
            let node = state
                .nodes
                .get(key)
                .unwrap_or_else(|| panic!("{} lists {} but the node is gone", id, key));
            assert!(
                node.contains(*id),
                "{} lists {} but the node does not file it",
                id,
                key
            );
        }
    }
    for (key, node) in state.nodes.iter() {
        for id in node.ids() {
            let locations = state
                .entities
                .locations(*id)
                .unwrap_or_else(|| panic!("{} files {} but the entity is gone", key, id));
            assert!(
                locations.contains(key),
                "{} files {} but the entity does not list it",
                key,
                id
            );
        }
    }
}

#[test]
fn test_insert_lookup_roundtrip() {
    let octree = small_octree(10, 5);
    let position = Point3::new(3.0, 2.0, 1.0);
    let id = octree.insert("a", position, 3).unwrap();
    assert!(octree.lookup(&position, 3).unwrap().contains(&id));
    octree.remove(id).unwrap();
    assert!(octree.lookup(&position, 3).unwrap().is_empty());
    assert_eq!(octree.node_count(), 0);
    assert!(!octree.contains(id));
}

#[test]
fn test_subdivision_scenario() {
    // Capacity 2, max_level 5: cells at level 3 have edge 4.
    let octree = small_octree(2, 5);
    let a = octree.insert("A", Point3::new(1.0, 1.0, 1.0), 3).unwrap();
    let b = octree.insert("B", Point3::new(1.0, 1.0, 2.0), 3).unwrap();
    let c = octree.insert("C", Point3::new(5.0, 5.0, 5.0), 3).unwrap();

    let mut found = octree.lookup(&Point3::new(1.0, 1.0, 1.0), 3).unwrap();
    found.sort();
    assert_eq!(found, vec![a, b]);

    // The third resident overflows the cell and triggers one subdivision.
    let d = octree.insert("D", Point3::new(1.0, 1.0, 3.0), 3).unwrap();

    // The parent cell itself is now empty; the entities moved one level
    // down (level 4 cells have edge 2).
    assert!(octree
        .lookup_exact(&Point3::new(1.0, 1.0, 1.0), 3)
        .unwrap()
        .is_empty());
    assert_eq!(
        octree.lookup(&Point3::new(1.0, 1.0, 1.0), 4).unwrap(),
        vec![a]
    );
    for (id, position) in &[
        (a, Point3::new(1.0, 1.0, 1.0)),
        (b, Point3::new(1.0, 1.0, 2.0)),
        (d, Point3::new(1.0, 1.0, 3.0)),
    ] {
        assert!(
            octree.lookup(position, 4).unwrap().contains(id),
            "{} not reachable at level 4",
            id
        );
    }
    // C keeps its own level-3 cell.
    assert_eq!(
        octree.lookup_exact(&Point3::new(5.0, 5.0, 5.0), 3).unwrap(),
        vec![c]
    );
    // The descending lookup also resolves through the subdivided parent.
    assert_eq!(
        octree.lookup(&Point3::new(1.0, 1.0, 1.0), 3).unwrap(),
        vec![a]
    );
    assert_relation_symmetric(&octree);
}

#[test]
fn test_spanning_scenario() {
    // Level-3 cells have edge 2 under max_level 4; the box [0.5, 2.5]^3
    // crosses the cell boundary at 2 on every axis.
    let octree = Octree::new(Options {
        node_capacity: 10,
        max_level: 4,
        spanning_enabled: true,
        ..Default::default()
    })
    .unwrap();
    let bounds = Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(2.5, 2.5, 2.5));
    let id = octree
        .insert_with_bounds("spanner", Point3::new(1.5, 1.5, 1.5), bounds, 3)
        .unwrap();
    assert_eq!(octree.location_count(id).unwrap(), 8);
    assert_eq!(octree.node_count(), 8);
    assert_relation_symmetric(&octree);

    octree.remove(id).unwrap();
    assert_eq!(octree.node_count(), 0);
    assert_eq!(octree.entity_count(), 0);
}

#[test]
fn test_spanning_disabled_files_at_position_only() {
    let octree = small_octree(10, 4);
    let bounds = Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(2.5, 2.5, 2.5));
    let id = octree
        .insert_with_bounds("boxed", Point3::new(1.5, 1.5, 1.5), bounds.clone(), 3)
        .unwrap();
    assert_eq!(octree.location_count(id).unwrap(), 1);
    assert_eq!(octree.bounds(id).unwrap(), Some(bounds));
}

#[test]
fn test_spanning_never_subdivides() {
    let octree = Octree::new(Options {
        node_capacity: 1,
        max_level: 4,
        spanning_enabled: true,
        ..Default::default()
    })
    .unwrap();
    let bounds = Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(2.5, 2.5, 2.5));
    for i in 0..3 {
        octree
            .insert_with_bounds(i, Point3::new(1.5, 1.5, 1.5), bounds.clone(), 3)
            .unwrap();
    }
    // Three spanning entities crowd each cell past capacity 1, yet no
    // node may subdivide.
    let state = octree.read_state();
    for (_, node) in state.nodes.iter() {
        assert!(!node.has_children());
        assert_eq!(node.len(), 3);
    }
}

#[test]
fn test_update_moves_entity() {
    let octree = small_octree(4, 5);
    let id = octree.insert("mover", Point3::new(1.0, 1.0, 1.0), 3).unwrap();
    octree.update(id, Point3::new(9.0, 9.0, 9.0), 3).unwrap();
    assert!(octree.lookup(&Point3::new(1.0, 1.0, 1.0), 3).unwrap().is_empty());
    assert!(octree
        .lookup(&Point3::new(9.0, 9.0, 9.0), 3)
        .unwrap()
        .contains(&id));
    assert_eq!(octree.position(id).unwrap(), Point3::new(9.0, 9.0, 9.0));
    assert_relation_symmetric(&octree);

    let missing = EntityId::from_u64(9999);
    let err = octree.update(missing, Point3::new(1.0, 1.0, 1.0), 3).unwrap_err();
    match err.kind() {
        ErrorKind::EntityNotFound(id) => assert_eq!(*id, 9999),
        other => panic!("expected EntityNotFound, got {:?}", other),
    }
}

#[test]
fn test_single_content_mode_evicts() {
    let octree = Octree::new(Options {
        single_content_mode: true,
        max_level: 4,
        ..Default::default()
    })
    .unwrap();
    let position = Point3::new(1.0, 1.0, 1.0);
    let first = octree.insert("first", position, 3).unwrap();
    let second = octree.insert("second", position, 3).unwrap();
    // One resident per cell: the newcomer displaced the first entity.
    assert!(!octree.contains(first));
    assert_eq!(octree.lookup(&position, 3).unwrap(), vec![second]);
    let state = octree.read_state();
    for (_, node) in state.nodes.iter() {
        assert!(node.len() <= 1);
        assert!(!node.has_children());
    }
}

#[test]
fn test_negative_coordinates_rejected() {
    let octree = small_octree(10, 5);
    assert!(octree.insert("bad", Point3::new(-0.5, 1.0, 1.0), 3).is_err());
    assert!(octree.lookup(&Point3::new(0.0, -2.0, 0.0), 3).is_err());
    let bounds = Aabb::new(Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
    assert!(octree
        .insert_with_bounds("bad", Point3::new(1.0, 1.0, 1.0), bounds, 3)
        .is_err());
}

#[test]
fn test_level_beyond_max_rejected() {
    let octree = small_octree(10, 5);
    let err = octree.insert("deep", Point3::new(1.0, 1.0, 1.0), 6).unwrap_err();
    match err.kind() {
        ErrorKind::InvalidConfiguration(_) => (),
        other => panic!("expected InvalidConfiguration, got {:?}", other),
    }
}

#[test]
fn test_range_filters_touched_cells() {
    // Entities share one level-2 cell (edge 16 under max_level 6); a
    // sphere overlapping that cell must not drag the far entity in.
    let octree = small_octree(10, 6);
    let near = octree.insert("near", Point3::new(2.0, 2.0, 2.0), 2).unwrap();
    let far = octree.insert("far", Point3::new(14.0, 14.0, 14.0), 2).unwrap();
    let volume = Volume::Sphere(Sphere::new(Point3::new(2.0, 2.0, 2.0), 3.0));
    let results = octree.range(&volume, &Point3::new(0.0, 0.0, 0.0)).unwrap();
    let ids: Vec<EntityId> = results.iter().map(|r| r.id).collect();
    assert!(ids.contains(&near));
    assert!(!ids.contains(&far), "touched-cell entity leaked into range");
}

#[test]
fn test_range_results_sorted_by_reference() {
    let octree = small_octree(10, 6);
    for (i, x) in [12.0, 4.0, 8.0].iter().enumerate() {
        octree.insert(i, Point3::new(*x, 1.0, 1.0), 3).unwrap();
    }
    let volume = Volume::Aabb(Aabb::new(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(16.0, 4.0, 4.0),
    ));
    let results = octree.range(&volume, &Point3::new(0.0, 1.0, 1.0)).unwrap();
    let xs: Vec<f64> = results.iter().map(|r| r.position.x).collect();
    assert_eq!(xs, vec![4.0, 8.0, 12.0]);
    let reversed = octree.range(&volume, &Point3::new(16.0, 1.0, 1.0)).unwrap();
    let xs: Vec<f64> = reversed.iter().map(|r| r.position.x).collect();
    assert_eq!(xs, vec![12.0, 8.0, 4.0]);
}

#[test]
fn test_convex_hull_query_scenario() {
    let octree = small_octree(10, 6);
    let inside = octree.insert("inside", Point3::new(5.0, 5.0, 5.0), 4).unwrap();
    octree.insert("outside", Point3::new(20.0, 5.0, 5.0), 4).unwrap();
    let hull = ConvexHull::from_aabb(&Aabb::new(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(10.0, 10.0, 10.0),
    ));
    let results = octree.convex_hull(hull, &Point3::new(0.0, 0.0, 0.0)).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, inside);
    assert_eq!(results[0].classification, Relation::In);
    // Five units from the nearest face.
    assert!((results[0].penetration - 5.0).abs() < 1e-9);
    assert!(results[0].distance_to_hull_center.is_some());
}

#[test]
fn test_plane_query() {
    let octree = small_octree(10, 6);
    let behind = octree.insert("behind", Point3::new(2.0, 1.0, 1.0), 3).unwrap();
    octree.insert("ahead", Point3::new(9.0, 1.0, 1.0), 3).unwrap();
    // x = 5, half-space towards -x.
    let plane = Plane::new(1.0, 0.0, 0.0, -5.0);
    let results = octree.plane(&plane, &Point3::new(0.0, 0.0, 0.0)).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, behind);
    assert_eq!(results[0].classification, Relation::In);
}

#[test]
fn test_ray_query() {
    let octree = Octree::new(Options {
        node_capacity: 10,
        max_level: 6,
        spanning_enabled: true,
        ..Default::default()
    })
    .unwrap();
    let hit = octree
        .insert_with_bounds(
            "hit",
            Point3::new(8.5, 1.0, 1.0),
            Aabb::new(Point3::new(8.0, 0.5, 0.5), Point3::new(9.0, 1.5, 1.5)),
            4,
        )
        .unwrap();
    octree
        .insert_with_bounds(
            "missed",
            Point3::new(8.5, 9.0, 1.0),
            Aabb::new(Point3::new(8.0, 8.5, 0.5), Point3::new(9.0, 9.5, 1.5)),
            4,
        )
        .unwrap();
    let ray = crate::geometry::Ray::new(Point3::new(0.0, 1.0, 1.0), nalgebra::Vector3::x());
    let results = octree.ray(&ray, 100.0, &Point3::new(0.0, 1.0, 1.0)).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, hit);
    // Beyond t_max nothing is hit.
    assert!(octree
        .ray(&ray, 5.0, &Point3::new(0.0, 1.0, 1.0))
        .unwrap()
        .is_empty());
}

#[test]
fn test_k_nearest_scenario() {
    let octree: Octree<usize> = Octree::new(Options {
        node_capacity: 8,
        max_level: 7,
        ..Default::default()
    })
    .unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let mut positions = Vec::new();
    for i in 0..100 {
        let position = Point3::new(
            rng.gen_range(0.0, 100.0),
            rng.gen_range(0.0, 100.0),
            rng.gen_range(0.0, 100.0),
        );
        positions.push(position);
        octree.insert(i, position, 4).unwrap();
    }
    let q = Point3::new(50.0, 50.0, 50.0);
    let results = octree.k_nearest(&q, 3).unwrap();
    assert_eq!(results.len(), 3);
    let distances: Vec<f64> = results.iter().map(|r| r.distance_to_ref).collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    // No unreturned entity is closer than the returned ones.
    let returned: Vec<EntityId> = results.iter().map(|r| r.id).collect();
    let best_unreturned = positions
        .iter()
        .enumerate()
        .filter(|(i, _)| !returned.contains(&EntityId::from_u64(*i as u64)))
        .map(|(_, p)| (p - q).norm())
        .fold(f64::MAX, f64::min);
    assert!(distances[2] <= best_unreturned);
}

#[test]
fn test_k_nearest_distance_matches_query_point() {
    // distance_to_ref in kNN results is measured from q itself.
    let octree = small_octree(4, 6);
    octree.insert("a", Point3::new(10.0, 10.0, 10.0), 4).unwrap();
    octree.insert("b", Point3::new(12.0, 10.0, 10.0), 4).unwrap();
    let results = octree.k_nearest(&Point3::new(9.0, 10.0, 10.0), 2).unwrap();
    assert_eq!(results.len(), 2);
    assert!((results[0].distance_to_ref - 1.0).abs() < 1e-9);
    assert!((results[1].distance_to_ref - 3.0).abs() < 1e-9);
}

#[test]
fn test_statistics() {
    let octree = small_octree(10, 6);
    octree.insert("in", Point3::new(5.0, 5.0, 5.0), 4).unwrap();
    octree.insert("out", Point3::new(30.0, 30.0, 30.0), 4).unwrap();
    let hull = ConvexHull::from_aabb(&Aabb::new(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(10.0, 10.0, 10.0),
    ));
    let stats = octree.statistics(&Volume::ConvexHull(hull));
    assert_eq!(stats.inside, 1);
    assert_eq!(stats.outside, 1);
    assert_eq!(stats.intersecting, 0);
    assert!((stats.penetration_sum - 5.0).abs() < 1e-9);
    assert!((stats.penetration_avg - 5.0).abs() < 1e-9);
}

#[test]
fn test_batch_maps_each_query() {
    let octree = small_octree(10, 6);
    octree.insert("a", Point3::new(2.0, 2.0, 2.0), 3).unwrap();
    octree.insert("b", Point3::new(30.0, 30.0, 30.0), 3).unwrap();
    let queries = vec![
        Volume::Sphere(Sphere::new(Point3::new(2.0, 2.0, 2.0), 1.0)),
        Volume::Sphere(Sphere::new(Point3::new(30.0, 30.0, 30.0), 1.0)),
        Volume::Sphere(Sphere::new(Point3::new(60.0, 60.0, 60.0), 1.0)),
    ];
    let results = octree.batch(&queries, &Point3::new(0.0, 0.0, 0.0)).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].len(), 1);
    assert_eq!(results[1].len(), 1);
    assert!(results[2].is_empty());
}

#[test]
fn test_range_parallel_matches_sequential() {
    let mut parallel = crate::executor::ExecutorOptions::default();
    parallel.min_parallel_size = 1;
    parallel.chunk_size = 16;
    let octree: Octree<usize> = Octree::new(Options {
        node_capacity: 8,
        max_level: 7,
        parallel,
        ..Default::default()
    })
    .unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    for i in 0..300 {
        let position = Point3::new(
            rng.gen_range(0.0, 64.0),
            rng.gen_range(0.0, 64.0),
            rng.gen_range(0.0, 64.0),
        );
        octree.insert(i, position, 4).unwrap();
    }
    let volume = Volume::Sphere(Sphere::new(Point3::new(32.0, 32.0, 32.0), 20.0));
    let reference = Point3::new(0.0, 0.0, 0.0);
    let sequential = octree.range(&volume, &reference).unwrap();
    assert!(!sequential.is_empty());
    let run = octree.range_parallel(&volume, &reference).unwrap();
    assert!(run.report.error.is_none());
    assert!(!run.report.timed_out);
    let sequential_ids: Vec<EntityId> = sequential.iter().map(|r| r.id).collect();
    let parallel_ids: Vec<EntityId> = run.results.iter().map(|r| r.id).collect();
    assert_eq!(sequential_ids, parallel_ids);
}

#[test]
fn test_bulk_strategies_agree_on_membership() {
    let mut rng = StdRng::seed_from_u64(11);
    let positions: Vec<Point3<f64>> = (0..200)
        .map(|_| {
            Point3::new(
                rng.gen_range(0.0, 60.0),
                rng.gen_range(0.0, 60.0),
                rng.gen_range(0.0, 60.0),
            )
        })
        .collect();
    let volume = Volume::Sphere(Sphere::new(Point3::new(30.0, 30.0, 30.0), 15.0));
    let reference = Point3::new(0.0, 0.0, 0.0);
    let mut per_strategy = Vec::new();
    for strategy in &[
        BulkStrategy::TopDown,
        BulkStrategy::BottomUp,
        BulkStrategy::Hybrid,
    ] {
        let octree: Octree<usize> = Octree::new(Options {
            node_capacity: 8,
            max_level: 6,
            bulk_strategy: *strategy,
            ..Default::default()
        })
        .unwrap();
        let stats = BulkLoader::new(&octree)
            .build(positions.clone(), (0..200).collect(), 1)
            .unwrap();
        assert_eq!(stats.entities_processed, 200);
        assert_relation_symmetric(&octree);
        let mut hits: Vec<f64> = octree
            .range(&volume, &reference)
            .unwrap()
            .iter()
            .map(|r| r.position.x)
            .collect();
        hits.sort_by(|a, b| a.partial_cmp(b).unwrap());
        per_strategy.push(hits);
    }
    assert_eq!(per_strategy[0], per_strategy[1]);
    assert_eq!(per_strategy[0], per_strategy[2]);
}

#[test]
fn test_index_stats() {
    let octree = small_octree(2, 5);
    for x in &[1.0, 2.0, 3.0, 17.0] {
        octree.insert("point", Point3::new(*x, 1.0, 1.0), 3).unwrap();
    }
    let stats = octree.index_stats();
    assert_eq!(stats.entity_count, 4);
    assert!(stats.node_count > 0);
    assert_eq!(
        stats.nodes_per_level.iter().sum::<usize>(),
        stats.node_count
    );
}
