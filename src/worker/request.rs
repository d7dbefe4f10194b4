//! Task families and typed requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::PoolError;
use crate::tasks::{GifRequest, ImageRequest, PdfRequest};

/// A category of background work sharing one pool of slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFamily {
    /// Image resize, compression and format conversion
    Image,
    /// GIF encoding
    Gif,
    /// PDF page manipulation
    Pdf,
}

impl TaskFamily {
    /// Every family, in registration order
    pub const ALL: [Self; 3] = [Self::Image, Self::Gif, Self::Pdf];

    /// Lowercase name used on the string-keyed entry points
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Gif => "gif",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for TaskFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskFamily {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "gif" => Ok(Self::Gif),
            "pdf" => Ok(Self::Pdf),
            _ => Err(PoolError::UnknownFamily {
                name: s.to_string(),
            }),
        }
    }
}

/// A request addressed to one family.
///
/// The operation is the inner variant, so an unknown operation cannot be
/// constructed from Rust code. String-keyed callers go through
/// [`TaskRequest::from_named`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "family", content = "request", rename_all = "lowercase")]
pub enum TaskRequest {
    /// Image family request
    Image(ImageRequest),
    /// GIF family request
    Gif(GifRequest),
    /// PDF family request
    Pdf(PdfRequest),
}

impl TaskRequest {
    /// Family that must execute this request
    #[must_use]
    pub fn family(&self) -> TaskFamily {
        match self {
            Self::Image(_) => TaskFamily::Image,
            Self::Gif(_) => TaskFamily::Gif,
            Self::Pdf(_) => TaskFamily::Pdf,
        }
    }

    /// Operation name, as used on the string-keyed entry point
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Image(req) => req.operation(),
            Self::Gif(req) => req.operation(),
            Self::Pdf(req) => req.operation(),
        }
    }

    /// Builds a typed request from a family, an operation name and a JSON
    /// payload object holding the operation's fields.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidRequest`] if the payload is not an object,
    /// the operation does not exist for the family, or a field is malformed.
    pub fn from_named(
        family: TaskFamily,
        operation: &str,
        payload: serde_json::Value,
    ) -> Result<Self, PoolError> {
        let invalid = |reason: String| PoolError::InvalidRequest { family, reason };

        let serde_json::Value::Object(mut fields) = payload else {
            return Err(invalid("payload must be a JSON object".to_string()));
        };
        fields.insert(
            "operation".to_string(),
            serde_json::Value::String(operation.to_string()),
        );
        let value = serde_json::Value::Object(fields);

        let request = match family {
            TaskFamily::Image => serde_json::from_value(value).map(Self::Image),
            TaskFamily::Gif => serde_json::from_value(value).map(Self::Gif),
            TaskFamily::Pdf => serde_json::from_value(value).map(Self::Pdf),
        };
        request.map_err(|e| invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_family_from_str() {
        assert_eq!("image".parse::<TaskFamily>().unwrap(), TaskFamily::Image);
        assert_eq!(" GIF ".parse::<TaskFamily>().unwrap(), TaskFamily::Gif);
        assert_eq!("pdf".parse::<TaskFamily>().unwrap(), TaskFamily::Pdf);
    }

    #[test]
    fn test_family_from_str_unknown() {
        let err = "video".parse::<TaskFamily>().unwrap_err();
        assert_eq!(
            err,
            PoolError::UnknownFamily {
                name: "video".to_string()
            }
        );
    }

    #[test]
    fn test_from_named_resize() {
        let request = TaskRequest::from_named(
            TaskFamily::Image,
            "resize",
            json!({ "data": [1, 2, 3], "options": { "width": 100, "height": 100 } }),
        )
        .unwrap();

        assert_eq!(request.family(), TaskFamily::Image);
        assert_eq!(request.operation(), "resize");
    }

    #[test]
    fn test_from_named_unknown_operation() {
        let err = TaskRequest::from_named(TaskFamily::Pdf, "explode", json!({ "data": [] }))
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::InvalidRequest {
                family: TaskFamily::Pdf,
                ..
            }
        ));
    }

    #[test]
    fn test_from_named_rejects_non_object() {
        let err = TaskRequest::from_named(TaskFamily::Gif, "encode_frames", json!([1, 2]))
            .unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }
}
