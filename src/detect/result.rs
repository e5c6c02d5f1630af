/// Result of running detection on a frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Bounding boxes (normalized 0..1 coordinates), strongest first.
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    /// Number of surviving detections.
    pub fn count(&self) -> usize {
        self.detections.len()
    }

    /// The highest-confidence detection, if any.
    pub fn primary(&self) -> Option<&Detection> {
        self.detections
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

/// A single detection in normalized 0..1 coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
}

impl Detection {
    fn x2(&self) -> f32 {
        self.x + self.w
    }

    fn y2(&self) -> f32 {
        self.y + self.h
    }
}

/// Intersection-over-union of two normalized boxes.
pub fn bbox_iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.x2().min(b.x2());
    let y2 = a.y2().min(b.y2());

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = a.w * a.h;
    let area_b = b.w * b.h;
    inter / (area_a + area_b - inter)
}

/// Greedy non-maximum suppression. Keeps the strongest box of every
/// overlapping cluster; `person_count` is the length of the returned set.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if bbox_iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
        keep.push(detections[i].clone());
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Detection {
        Detection {
            x,
            y,
            w,
            h,
            confidence,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = det(0.1, 0.1, 0.4, 0.4, 0.9);
        assert!((bbox_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = det(0.0, 0.0, 0.2, 0.2, 0.9);
        let b = det(0.7, 0.7, 0.2, 0.2, 0.8);
        assert_eq!(bbox_iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_suppresses_overlapping_boxes() {
        let boxes = vec![
            det(0.10, 0.10, 0.50, 0.50, 0.9),
            det(0.12, 0.12, 0.50, 0.50, 0.7),
        ];
        let kept = nms(boxes, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn nms_keeps_separate_boxes() {
        let boxes = vec![
            det(0.0, 0.0, 0.2, 0.2, 0.9),
            det(0.6, 0.6, 0.2, 0.2, 0.8),
        ];
        let kept = nms(boxes, 0.3);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn primary_is_highest_confidence() {
        let result = DetectionResult {
            detections: vec![
                det(0.0, 0.0, 0.2, 0.2, 0.5),
                det(0.5, 0.5, 0.2, 0.2, 0.8),
            ],
        };
        assert!((result.primary().unwrap().confidence - 0.8).abs() < 1e-6);
        assert_eq!(result.count(), 2);
    }
}
