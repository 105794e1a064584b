//! Box overlap, face/body alignment and nearest-person lookup.

use crate::types::{BoundingBox, Point};

/// Intersection area of `small` and `large` divided by the area of `small`.
///
/// Returns 0.0 when `small` has zero area. The result is always in [0, 1].
pub fn overlap_ratio(small: &BoundingBox, large: &BoundingBox) -> f32 {
    let small_area = small.area();
    if small_area <= 0.0 {
        return 0.0;
    }

    let ix1 = small.x1.max(large.x1);
    let iy1 = small.y1.max(large.y1);
    let ix2 = small.x2.min(large.x2);
    let iy2 = small.y2.min(large.y2);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);

    (inter / small_area).clamp(0.0, 1.0)
}

/// Loose "head sits above torso" test between a face box and a body box.
///
/// Horizontal: face center within 80% of the body width from the body center.
/// Vertical: face center between 30% of body height above the top edge and
/// 50% of body height below it.
pub fn is_aligned(face: &BoundingBox, body: &BoundingBox) -> bool {
    let face_center = face.center();
    let body_center = body.center();
    let body_w = body.width();
    let body_h = body.height();

    let x_aligned = (face_center.x - body_center.x).abs() < body_w * 0.8;
    let upper = body.y1 - body_h * 0.3;
    let chest = body.y1 + body_h * 0.5;

    x_aligned && upper < face_center.y && face_center.y < chest
}

/// A person candidate for cup attribution.
#[derive(Debug, Clone, Copy)]
pub struct PersonPoint<T> {
    pub center: Point,
    pub identity: T,
}

/// Identity of the person whose center is closest to `point`.
///
/// Returns `None` for an empty list or when the closest person is not
/// strictly nearer than `max_distance`.
pub fn nearest_person<T: Copy>(
    point: &Point,
    people: &[PersonPoint<T>],
    max_distance: f32,
) -> Option<T> {
    let mut best: Option<(T, f32)> = None;
    for p in people {
        let dist = point.distance(&p.center);
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((p.identity, dist));
        }
    }
    match best {
        Some((identity, dist)) if dist < max_distance => Some(identity),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2)
    }

    #[test]
    fn test_overlap_self_is_one() {
        let a = bx(10.0, 20.0, 50.0, 80.0);
        assert!((overlap_ratio(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_overlap_disjoint_is_zero() {
        let a = bx(0.0, 0.0, 10.0, 10.0);
        let b = bx(20.0, 20.0, 30.0, 30.0);
        assert_eq!(overlap_ratio(&a, &b), 0.0);
        assert_eq!(overlap_ratio(&b, &a), 0.0);
    }

    #[test]
    fn test_overlap_zero_area_small() {
        let line = bx(5.0, 5.0, 5.0, 20.0);
        let b = bx(0.0, 0.0, 30.0, 30.0);
        assert_eq!(overlap_ratio(&line, &b), 0.0);
    }

    #[test]
    fn test_overlap_partial_is_relative_to_small() {
        // Phone half inside a person box.
        let phone = bx(90.0, 50.0, 110.0, 70.0);
        let person = bx(0.0, 0.0, 100.0, 200.0);
        assert!((overlap_ratio(&phone, &person) - 0.5).abs() < 1e-6);
        // Reversed roles give a different (much smaller) number.
        assert!(overlap_ratio(&person, &phone) < 0.02);
    }

    #[test]
    fn test_overlap_bounded() {
        let boxes = [
            bx(0.0, 0.0, 10.0, 10.0),
            bx(5.0, 5.0, 15.0, 15.0),
            bx(-20.0, -20.0, 40.0, 40.0),
            bx(9.0, 0.0, 11.0, 100.0),
        ];
        for a in &boxes {
            for b in &boxes {
                let r = overlap_ratio(a, b);
                assert!((0.0..=1.0).contains(&r), "ratio {r} out of range");
            }
        }
    }

    #[test]
    fn test_aligned_head_above_torso() {
        let body = bx(100.0, 100.0, 200.0, 400.0);
        let face = bx(130.0, 60.0, 170.0, 110.0); // center (150, 85)
        assert!(is_aligned(&face, &body));
    }

    #[test]
    fn test_not_aligned_face_at_waist() {
        let body = bx(100.0, 100.0, 200.0, 400.0);
        let face = bx(130.0, 280.0, 170.0, 320.0); // center y=300, chest=250
        assert!(!is_aligned(&face, &body));
    }

    #[test]
    fn test_not_aligned_far_sideways() {
        let body = bx(100.0, 100.0, 200.0, 400.0);
        let face = bx(260.0, 100.0, 300.0, 140.0); // dx = 130 > 80
        assert!(!is_aligned(&face, &body));
    }

    #[test]
    fn test_aligned_translation_invariant() {
        let cases = [
            (bx(130.0, 60.0, 170.0, 110.0), bx(100.0, 100.0, 200.0, 400.0)),
            (bx(130.0, 280.0, 170.0, 320.0), bx(100.0, 100.0, 200.0, 400.0)),
            (bx(0.0, 0.0, 20.0, 20.0), bx(10.0, 5.0, 60.0, 120.0)),
        ];
        for (face, body) in cases {
            let expected = is_aligned(&face, &body);
            for (dx, dy) in [(64.0, 0.0), (-32.0, 128.0), (256.0, -16.0)] {
                assert_eq!(
                    is_aligned(&face.translated(dx, dy), &body.translated(dx, dy)),
                    expected
                );
            }
        }
    }

    #[test]
    fn test_nearest_person() {
        let people = [
            PersonPoint { center: Point::new(0.0, 0.0), identity: "ALICE" },
            PersonPoint { center: Point::new(100.0, 0.0), identity: "BOB" },
        ];
        assert_eq!(nearest_person(&Point::new(80.0, 0.0), &people, 600.0), Some("BOB"));
        assert_eq!(nearest_person(&Point::new(10.0, 5.0), &people, 600.0), Some("ALICE"));
    }

    #[test]
    fn test_nearest_person_too_far_or_empty() {
        let people = [PersonPoint { center: Point::new(0.0, 0.0), identity: "ALICE" }];
        assert_eq!(nearest_person(&Point::new(700.0, 0.0), &people, 600.0), None);
        let nobody: [PersonPoint<&str>; 0] = [];
        assert_eq!(nearest_person(&Point::new(0.0, 0.0), &nobody, 600.0), None);
    }
}
