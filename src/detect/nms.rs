use super::result::Detection;

/// Greedy per-class non-maximum suppression.
///
/// Returns the surviving detections sorted by descending confidence.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; detections.len()];
    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_id != detections[j].class_id {
                continue;
            }
            if detections[i].bbox.iou(&detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    detections
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !suppressed[*idx])
        .map(|(_, det)| det)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(class_id: usize, confidence: f32, x: f32) -> Detection {
        Detection::new(class_id, "c", confidence, BoundingBox::new(x, 0.0, x + 10.0, 10.0))
    }

    #[test]
    fn overlapping_same_class_boxes_collapse() {
        let kept = non_max_suppression(vec![det(0, 0.6, 1.0), det(0, 0.9, 0.0)], 0.45);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn different_classes_are_not_suppressed() {
        let kept = non_max_suppression(vec![det(0, 0.6, 0.0), det(1, 0.9, 0.0)], 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn chained_overlaps_only_suppress_against_kept_boxes() {
        // b overlaps a and c, a and c do not overlap; b is dropped, so c survives.
        let kept = non_max_suppression(
            vec![det(0, 0.9, 0.0), det(0, 0.8, 4.0), det(0, 0.7, 8.0)],
            0.3,
        );
        let xs: Vec<f32> = kept.iter().map(|d| d.bbox.x1).collect();
        assert_eq!(xs, vec![0.0, 8.0]);
    }

    #[test]
    fn disjoint_boxes_survive() {
        let kept = non_max_suppression(vec![det(0, 0.6, 0.0), det(0, 0.9, 50.0)], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
    }
}
