//! Transformation parameter types
//!
//! Supported operations form a closed tagged union rather than a free-form
//! parameter dictionary. Requests carry an ordered list of operations, but
//! two orderings of the same distinction matter:
//!
//! - hashing and deduplication are order-independent: requests are
//!   canonicalized (sorted into the fixed pipeline order) before hashing, so
//!   `[rotate, blur]` and `[blur, rotate]` resolve to the same version;
//! - application is order-fixed: background removal, then resize, then
//!   rotate, then grayscale, then blur. Blur runs last so it never smears
//!   detail that a later step would discard, and background removal runs
//!   first because it invalidates downstream framing.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// How resize treats the aspect ratio
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Fit within the requested bounds, preserving aspect ratio
    Fit,
    /// Force exact dimensions, distorting if necessary
    Stretch,
}

impl ResizeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResizeMode::Fit => "fit",
            ResizeMode::Stretch => "stretch",
        }
    }
}

/// One supported transformation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    RemoveBackground,
    Resize {
        width: Option<i32>,
        height: Option<i32>,
        mode: ResizeMode,
    },
    Rotate {
        angle: i32,
    },
    Grayscale,
    Blur {
        radius: f32,
    },
}

impl TransformOp {
    /// Position in the fixed application order
    fn pipeline_rank(&self) -> u8 {
        match self {
            TransformOp::RemoveBackground => 0,
            TransformOp::Resize { .. } => 1,
            TransformOp::Rotate { .. } => 2,
            TransformOp::Grayscale => 3,
            TransformOp::Blur { .. } => 4,
        }
    }

    /// Short name for validation messages and duplicate detection
    pub fn kind(&self) -> &'static str {
        match self {
            TransformOp::RemoveBackground => "remove_background",
            TransformOp::Resize { .. } => "resize",
            TransformOp::Rotate { .. } => "rotate",
            TransformOp::Grayscale => "grayscale",
            TransformOp::Blur { .. } => "blur",
        }
    }

    /// Cache namespace fragment for this operation
    ///
    /// Operations with continuous parameters fold them into the identifier so
    /// e.g. blur at radius 2 and radius 5 occupy distinct cache namespaces.
    pub fn namespace(&self) -> String {
        match self {
            TransformOp::RemoveBackground => "remove_background".to_string(),
            TransformOp::Resize {
                width,
                height,
                mode,
            } => {
                let w = width.map_or_else(|| "auto".to_string(), |v| v.to_string());
                let h = height.map_or_else(|| "auto".to_string(), |v| v.to_string());
                format!("resize:{}x{}:{}", w, h, mode.as_str())
            }
            TransformOp::Rotate { angle } => format!("rotate:{}", angle),
            TransformOp::Grayscale => "grayscale".to_string(),
            TransformOp::Blur { radius } => format!("blur:{}", radius),
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        match self {
            TransformOp::Blur { radius } => {
                if !radius.is_finite() || *radius <= 0.0 {
                    return Err(AppError::validation(
                        "blur.radius",
                        format!("must be a positive finite number, got {}", radius),
                    ));
                }
            }
            TransformOp::Rotate { angle } => {
                if angle % 90 != 0 {
                    return Err(AppError::validation(
                        "rotate.angle",
                        format!("must be a multiple of 90 degrees, got {}", angle),
                    ));
                }
            }
            TransformOp::Resize {
                width,
                height,
                mode: _,
            } => {
                if width.is_none() && height.is_none() {
                    return Err(AppError::validation(
                        "resize",
                        "at least one of width or height must be specified",
                    ));
                }
                if let Some(w) = width {
                    if *w <= 0 {
                        return Err(AppError::validation(
                            "resize.width",
                            format!("must be positive, got {}", w),
                        ));
                    }
                }
                if let Some(h) = height {
                    if *h <= 0 {
                        return Err(AppError::validation(
                            "resize.height",
                            format!("must be positive, got {}", h),
                        ));
                    }
                }
            }
            TransformOp::RemoveBackground | TransformOp::Grayscale => {}
        }
        Ok(())
    }
}

/// A transformation request: one or more operations applied as a unit
///
/// The produced version is keyed by the canonical form of this request, so
/// composites dedup against themselves regardless of how the caller ordered
/// the operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformRequest {
    pub ops: Vec<TransformOp>,
}

impl TransformRequest {
    pub fn new(ops: Vec<TransformOp>) -> Self {
        Self { ops }
    }

    /// Reject invalid parameters before any cache lookup or durable write
    pub fn validate(&self) -> Result<(), AppError> {
        if self.ops.is_empty() {
            return Err(AppError::validation(
                "ops",
                "at least one operation must be requested",
            ));
        }

        let mut seen: Vec<&'static str> = Vec::new();
        for op in &self.ops {
            if seen.contains(&op.kind()) {
                return Err(AppError::validation(
                    op.kind(),
                    "operation requested more than once in a single call",
                ));
            }
            seen.push(op.kind());
            op.validate()?;
        }
        Ok(())
    }

    /// Sort operations into the fixed pipeline order
    ///
    /// Both hashing and application run over the canonical form; the
    /// caller-supplied order never influences either.
    pub fn canonicalize(&self) -> TransformRequest {
        let mut ops = self.ops.clone();
        ops.sort_by_key(|op| op.pipeline_rank());
        TransformRequest { ops }
    }

    /// Cache namespace for the whole request: per-operation namespaces in
    /// canonical order, joined with `+`
    pub fn namespace(&self) -> String {
        self.canonicalize()
            .ops
            .iter()
            .map(|op| op.namespace())
            .collect::<Vec<_>>()
            .join("+")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_is_the_pipeline_order() {
        let request = TransformRequest::new(vec![
            TransformOp::Blur { radius: 2.0 },
            TransformOp::Grayscale,
            TransformOp::Rotate { angle: 90 },
            TransformOp::Resize {
                width: Some(50),
                height: None,
                mode: ResizeMode::Fit,
            },
            TransformOp::RemoveBackground,
        ]);

        let kinds: Vec<&str> = request
            .canonicalize()
            .ops
            .iter()
            .map(|op| op.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["remove_background", "resize", "rotate", "grayscale", "blur"]
        );
    }

    #[test]
    fn namespace_folds_continuous_parameters() {
        let blur_small = TransformRequest::new(vec![TransformOp::Blur { radius: 2.0 }]);
        let blur_large = TransformRequest::new(vec![TransformOp::Blur { radius: 5.0 }]);
        assert_ne!(blur_small.namespace(), blur_large.namespace());
        assert_eq!(blur_small.namespace(), "blur:2");
    }

    #[test]
    fn composite_namespace_is_order_independent() {
        let a = TransformRequest::new(vec![
            TransformOp::Blur { radius: 2.0 },
            TransformOp::Rotate { angle: 90 },
        ]);
        let b = TransformRequest::new(vec![
            TransformOp::Rotate { angle: 90 },
            TransformOp::Blur { radius: 2.0 },
        ]);
        assert_eq!(a.namespace(), b.namespace());
        assert_eq!(a.namespace(), "rotate:90+blur:2");
    }

    #[test]
    fn empty_request_is_rejected() {
        let err = TransformRequest::new(vec![]).validate().unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn duplicate_operations_are_rejected() {
        let request = TransformRequest::new(vec![
            TransformOp::Blur { radius: 2.0 },
            TransformOp::Blur { radius: 5.0 },
        ]);
        assert!(request.validate().is_err());
    }

    #[test]
    fn resize_requires_a_dimension() {
        let request = TransformRequest::new(vec![TransformOp::Resize {
            width: None,
            height: None,
            mode: ResizeMode::Fit,
        }]);
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("resize"));
    }

    #[test]
    fn negative_resize_dimension_names_the_field() {
        let request = TransformRequest::new(vec![TransformOp::Resize {
            width: Some(-50),
            height: None,
            mode: ResizeMode::Stretch,
        }]);
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("resize.width"));
    }

    #[test]
    fn non_quarter_turn_rotation_is_rejected() {
        let request = TransformRequest::new(vec![TransformOp::Rotate { angle: 45 }]);
        assert!(request.validate().is_err());
        let ok = TransformRequest::new(vec![TransformOp::Rotate { angle: 270 }]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn non_positive_blur_radius_is_rejected() {
        for radius in [0.0, -1.5, f32::NAN, f32::INFINITY] {
            let request = TransformRequest::new(vec![TransformOp::Blur { radius }]);
            assert!(request.validate().is_err(), "radius {} should fail", radius);
        }
    }

    #[test]
    fn ops_round_trip_through_tagged_json() {
        let request = TransformRequest::new(vec![
            TransformOp::Grayscale,
            TransformOp::Resize {
                width: Some(200),
                height: Some(100),
                mode: ResizeMode::Fit,
            },
        ]);
        let json = serde_json::to_string(&request).unwrap();
        let parsed: TransformRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }
}
