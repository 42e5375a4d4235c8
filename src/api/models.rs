use crate::error::ServiceError;
use crate::model::{ClusterScores, TripRecord};
use crate::predictor::FeatureVector;
use serde::{Deserialize, Deserializer, Serialize};

/// Input for user-specific clustering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringRequest {
    #[serde(deserialize_with = "deserialize_uid")]
    pub uid: String,
    /// Neighbourhood radius in kilometres
    pub distance: f64,
    pub min_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringResponse {
    pub df: Vec<TripRecord>,
    pub scores: ClusterScores,
}

/// Input for user-specific next location prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(deserialize_with = "deserialize_uid")]
    pub uid: String,
    pub lat_origin: f64,
    pub lng_origin: f64,
    pub timedelta: f64,
    pub month: u32,
    pub day: u32,
    pub day_of_week: u32,
    pub hour_in_day: u32,
    pub minute_in_hour: u32,
}

impl PredictionRequest {
    /// The model consumes the user id as a number
    pub fn into_features(self) -> Result<FeatureVector, ServiceError> {
        let uid = self
            .uid
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ServiceError::Validation(format!("uid must be numeric, got '{}'", self.uid))
            })?;

        Ok(FeatureVector {
            uid,
            lat_origin: self.lat_origin,
            lng_origin: self.lng_origin,
            timedelta: self.timedelta,
            month: self.month,
            day: self.day,
            day_of_week: self.day_of_week,
            hour_in_day: self.hour_in_day,
            minute_in_hour: self.minute_in_hour,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: String,
}

/// Accept the user id as a string or an integer; integers are zero-padded to
/// the three-digit GeoLife form
fn deserialize_uid<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawUid {
        Text(String),
        Number(u64),
    }

    Ok(match RawUid::deserialize(deserializer)? {
        RawUid::Text(uid) => uid.trim().to_string(),
        RawUid::Number(uid) => format!("{:03}", uid),
    })
}
