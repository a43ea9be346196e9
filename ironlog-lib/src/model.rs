//src/model.rs
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Units;
use crate::store::ObjectId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Field '{field}' does not apply to {category} sets")]
    FieldNotApplicable { field: SetField, category: Category },
    #[error("Exercise has no details chosen yet")]
    MissingDetails,
    #[error("Cannot copy a {found} set into a {expected} set")]
    CategoryMismatch { expected: Category, found: Category },
}

/// Discriminates which numeric fields a set carries.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum Category {
    WeightAndReps,
    Reps,
    Duration,
    DurationAndWeight,
    DistanceAndWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SetField {
    Weight,
    Reps,
    Rpe,
    Duration,
    Distance,
}

impl Category {
    /// Every field a set of this category carries.
    #[must_use]
    pub const fn fields(self) -> &'static [SetField] {
        match self {
            Self::WeightAndReps => &[SetField::Weight, SetField::Reps, SetField::Rpe],
            Self::Reps => &[SetField::Reps],
            Self::Duration => &[SetField::Duration],
            Self::DurationAndWeight => &[SetField::Duration, SetField::Weight],
            Self::DistanceAndWeight => &[SetField::Distance, SetField::Weight],
        }
    }

    /// Fields that must be filled before a set can be marked complete.
    #[must_use]
    pub const fn required_fields(self) -> &'static [SetField] {
        match self {
            Self::WeightAndReps => &[SetField::Weight, SetField::Reps],
            Self::Reps => &[SetField::Reps],
            Self::Duration => &[SetField::Duration],
            Self::DurationAndWeight => &[SetField::Duration, SetField::Weight],
            Self::DistanceAndWeight => &[SetField::Distance, SetField::Weight],
        }
    }

    #[must_use]
    pub fn requires(self, field: SetField) -> bool {
        self.required_fields().contains(&field)
    }
}

/// Category-shaped set values. Each variant only holds the fields its
/// category carries, so a weight on a duration set cannot exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum SetValues {
    WeightAndReps {
        weight: Option<f64>,
        reps: Option<u32>,
        rpe: Option<f64>,
    },
    Reps {
        reps: Option<u32>,
    },
    Duration {
        duration_seconds: Option<u32>,
    },
    DurationAndWeight {
        duration_seconds: Option<u32>,
        weight: Option<f64>,
    },
    DistanceAndWeight {
        distance: Option<f64>,
        weight: Option<f64>,
    },
}

impl SetValues {
    #[must_use]
    pub const fn empty(category: Category) -> Self {
        match category {
            Category::WeightAndReps => Self::WeightAndReps {
                weight: None,
                reps: None,
                rpe: None,
            },
            Category::Reps => Self::Reps { reps: None },
            Category::Duration => Self::Duration {
                duration_seconds: None,
            },
            Category::DurationAndWeight => Self::DurationAndWeight {
                duration_seconds: None,
                weight: None,
            },
            Category::DistanceAndWeight => Self::DistanceAndWeight {
                distance: None,
                weight: None,
            },
        }
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        match self {
            Self::WeightAndReps { .. } => Category::WeightAndReps,
            Self::Reps { .. } => Category::Reps,
            Self::Duration { .. } => Category::Duration,
            Self::DurationAndWeight { .. } => Category::DurationAndWeight,
            Self::DistanceAndWeight { .. } => Category::DistanceAndWeight,
        }
    }

    /// Weight in kilograms.
    #[must_use]
    pub fn weight(&self) -> Option<f64> {
        match self {
            Self::WeightAndReps { weight, .. }
            | Self::DurationAndWeight { weight, .. }
            | Self::DistanceAndWeight { weight, .. } => *weight,
            Self::Reps { .. } | Self::Duration { .. } => None,
        }
    }

    #[must_use]
    pub fn reps(&self) -> Option<u32> {
        match self {
            Self::WeightAndReps { reps, .. } | Self::Reps { reps } => *reps,
            _ => None,
        }
    }

    #[must_use]
    pub fn rpe(&self) -> Option<f64> {
        match self {
            Self::WeightAndReps { rpe, .. } => *rpe,
            _ => None,
        }
    }

    #[must_use]
    pub fn duration_seconds(&self) -> Option<u32> {
        match self {
            Self::Duration { duration_seconds } | Self::DurationAndWeight { duration_seconds, .. } => {
                *duration_seconds
            }
            _ => None,
        }
    }

    /// Distance in kilometres.
    #[must_use]
    pub fn distance(&self) -> Option<f64> {
        match self {
            Self::DistanceAndWeight { distance, .. } => *distance,
            _ => None,
        }
    }

    #[must_use]
    pub fn is_present(&self, field: SetField) -> bool {
        match field {
            SetField::Weight => self.weight().is_some(),
            SetField::Reps => self.reps().is_some(),
            SetField::Rpe => self.rpe().is_some(),
            SetField::Duration => self.duration_seconds().is_some(),
            SetField::Distance => self.distance().is_some(),
        }
    }

    /// True when every field required by the category is filled.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.category()
            .required_fields()
            .iter()
            .all(|field| self.is_present(*field))
    }

    #[must_use]
    pub fn missing_fields(&self) -> Vec<SetField> {
        self.category()
            .required_fields()
            .iter()
            .copied()
            .filter(|field| !self.is_present(*field))
            .collect()
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the category has no weight.
    pub fn set_weight(&mut self, value: Option<f64>) -> Result<(), ModelError> {
        let category = self.category();
        match self {
            Self::WeightAndReps { weight, .. }
            | Self::DurationAndWeight { weight, .. }
            | Self::DistanceAndWeight { weight, .. } => {
                *weight = value;
                Ok(())
            }
            Self::Reps { .. } | Self::Duration { .. } => Err(ModelError::FieldNotApplicable {
                field: SetField::Weight,
                category,
            }),
        }
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the category has no reps.
    pub fn set_reps(&mut self, value: Option<u32>) -> Result<(), ModelError> {
        let category = self.category();
        match self {
            Self::WeightAndReps { reps, .. } | Self::Reps { reps } => {
                *reps = value;
                Ok(())
            }
            _ => Err(ModelError::FieldNotApplicable {
                field: SetField::Reps,
                category,
            }),
        }
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the category has no RPE.
    pub fn set_rpe(&mut self, value: Option<f64>) -> Result<(), ModelError> {
        let category = self.category();
        match self {
            Self::WeightAndReps { rpe, .. } => {
                *rpe = value;
                Ok(())
            }
            _ => Err(ModelError::FieldNotApplicable {
                field: SetField::Rpe,
                category,
            }),
        }
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the category has no duration.
    pub fn set_duration_seconds(&mut self, value: Option<u32>) -> Result<(), ModelError> {
        let category = self.category();
        match self {
            Self::Duration { duration_seconds } | Self::DurationAndWeight { duration_seconds, .. } => {
                *duration_seconds = value;
                Ok(())
            }
            _ => Err(ModelError::FieldNotApplicable {
                field: SetField::Duration,
                category,
            }),
        }
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the category has no distance.
    pub fn set_distance(&mut self, value: Option<f64>) -> Result<(), ModelError> {
        let category = self.category();
        match self {
            Self::DistanceAndWeight { distance, .. } => {
                *distance = value;
                Ok(())
            }
            _ => Err(ModelError::FieldNotApplicable {
                field: SetField::Distance,
                category,
            }),
        }
    }

    #[must_use]
    pub fn weight_string(&self) -> String {
        self.weight().map(|v| v.to_string()).unwrap_or_default()
    }

    #[must_use]
    pub fn reps_string(&self) -> String {
        self.reps().map(|v| v.to_string()).unwrap_or_default()
    }

    #[must_use]
    pub fn rpe_string(&self) -> String {
        self.rpe().map(|v| v.to_string()).unwrap_or_default()
    }

    /// Duration as `m:ss`.
    #[must_use]
    pub fn duration_string(&self) -> String {
        self.duration_seconds()
            .map(|secs| format!("{}:{:02}", secs / 60, secs % 60))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn distance_string(&self) -> String {
        self.distance().map(|v| v.to_string()).unwrap_or_default()
    }

    /// One-line rendering in the user's units, `-` for empty fields.
    #[must_use]
    pub fn summary(&self, units: Units) -> String {
        let weight = || {
            self.weight().map_or_else(
                || "-".to_string(),
                |kg| format!("{:.1} {}", units.weight_for_display(kg), units.weight_label()),
            )
        };
        let or_dash = |s: String| if s.is_empty() { "-".to_string() } else { s };
        match self {
            Self::WeightAndReps { .. } => {
                let mut line = format!("{} x {}", weight(), or_dash(self.reps_string()));
                if let Some(rpe) = self.rpe() {
                    line.push_str(&format!(" @ RPE {rpe}"));
                }
                line
            }
            Self::Reps { .. } => format!("{} reps", or_dash(self.reps_string())),
            Self::Duration { .. } => or_dash(self.duration_string()),
            Self::DurationAndWeight { .. } => {
                format!("{} for {}", weight(), or_dash(self.duration_string()))
            }
            Self::DistanceAndWeight { .. } => {
                let distance = self.distance().map_or_else(
                    || "-".to_string(),
                    |km| {
                        format!(
                            "{:.2} {}",
                            units.distance_for_display(km),
                            units.distance_label()
                        )
                    },
                );
                format!("{} carrying {}", distance, weight())
            }
        }
    }
}

/// Tags whether an entry is a performed record or a reusable plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    Record,
    Template,
}

/// Shape shared by record and template sets.
pub trait SetShape: Clone + fmt::Debug + Serialize + DeserializeOwned {
    const KIND: EntryKind;

    fn blank(category: Category) -> Self;
    fn values(&self) -> &SetValues;

    fn category(&self) -> Category {
        self.values().category()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StoredSetRecord {
    id: Uuid,
    values: SetValues,
    #[serde(default)]
    complete: bool,
}

impl From<StoredSetRecord> for SetRecord {
    fn from(stored: StoredSetRecord) -> Self {
        let complete = stored.complete && stored.values.is_filled();
        Self {
            id: stored.id,
            values: stored.values,
            complete,
        }
    }
}

/// A set performed during a workout.
///
/// `complete` can only become true while every required field is filled,
/// and clearing a required field drops it back to false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredSetRecord")]
pub struct SetRecord {
    id: Uuid,
    values: SetValues,
    complete: bool,
}

impl SetRecord {
    #[must_use]
    pub fn new(category: Category) -> Self {
        Self::from_values(SetValues::empty(category))
    }

    #[must_use]
    pub fn from_values(values: SetValues) -> Self {
        Self {
            id: Uuid::new_v4(),
            values,
            complete: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns whether the assignment took effect. Marking a set complete
    /// is ignored while a required field is empty.
    pub fn set_complete(&mut self, complete: bool) -> bool {
        if complete && !self.values.is_filled() {
            return false;
        }
        self.complete = complete;
        true
    }

    pub fn toggle_complete(&mut self) -> bool {
        self.set_complete(!self.complete);
        self.complete
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the set's category has no weight.
    pub fn set_weight(&mut self, value: Option<f64>) -> Result<(), ModelError> {
        self.values.set_weight(value)?;
        self.enforce(SetField::Weight, value.is_none());
        Ok(())
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the set's category has no reps.
    pub fn set_reps(&mut self, value: Option<u32>) -> Result<(), ModelError> {
        self.values.set_reps(value)?;
        self.enforce(SetField::Reps, value.is_none());
        Ok(())
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the set's category has no RPE.
    pub fn set_rpe(&mut self, value: Option<f64>) -> Result<(), ModelError> {
        self.values.set_rpe(value)?;
        self.enforce(SetField::Rpe, value.is_none());
        Ok(())
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the set's category has no duration.
    pub fn set_duration_seconds(&mut self, value: Option<u32>) -> Result<(), ModelError> {
        self.values.set_duration_seconds(value)?;
        self.enforce(SetField::Duration, value.is_none());
        Ok(())
    }

    /// # Errors
    /// `ModelError::FieldNotApplicable` if the set's category has no distance.
    pub fn set_distance(&mut self, value: Option<f64>) -> Result<(), ModelError> {
        self.values.set_distance(value)?;
        self.enforce(SetField::Distance, value.is_none());
        Ok(())
    }

    /// Replaces every value with `other`'s, keeping this set's identity.
    /// # Errors
    /// `ModelError::CategoryMismatch` if the categories differ.
    pub fn copy_values_from(&mut self, other: &SetValues) -> Result<(), ModelError> {
        if other.category() != self.values.category() {
            return Err(ModelError::CategoryMismatch {
                expected: self.values.category(),
                found: other.category(),
            });
        }
        self.values = other.clone();
        if !self.values.is_filled() {
            self.complete = false;
        }
        Ok(())
    }

    fn enforce(&mut self, field: SetField, cleared: bool) {
        if cleared && self.values.category().requires(field) {
            self.complete = false;
        }
    }
}

impl SetShape for SetRecord {
    const KIND: EntryKind = EntryKind::Record;

    fn blank(category: Category) -> Self {
        Self::new(category)
    }

    fn values(&self) -> &SetValues {
        &self.values
    }
}

/// A planned set inside a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetTemplate {
    pub id: Uuid,
    pub values: SetValues,
}

impl SetTemplate {
    #[must_use]
    pub fn new(category: Category) -> Self {
        Self {
            id: Uuid::new_v4(),
            values: SetValues::empty(category),
        }
    }
}

impl SetShape for SetTemplate {
    const KIND: EntryKind = EntryKind::Template;

    fn blank(category: Category) -> Self {
        Self::new(category)
    }

    fn values(&self) -> &SetValues {
        &self.values
    }
}

impl From<&SetTemplate> for SetRecord {
    fn from(template: &SetTemplate) -> Self {
        Self::from_values(template.values.clone())
    }
}

/// A catalog exercise (e.g. "Pullups").
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseDetails {
    pub id: ObjectId,
    pub name: String,
    pub category: Category,
    /// Weak reference to the most recently completed `ExerciseRecord`.
    pub latest_completed_record: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseEntry<S> {
    pub id: Option<ObjectId>,
    pub created_at: DateTime<Utc>,
    pub details: Option<ExerciseDetails>,
    pub sets: Vec<S>,
}

pub type ExerciseRecord = ExerciseEntry<SetRecord>;
pub type ExerciseTemplate = ExerciseEntry<SetTemplate>;

impl<S: SetShape> ExerciseEntry<S> {
    #[must_use]
    pub fn new(details: Option<ExerciseDetails>) -> Self {
        Self {
            id: None,
            created_at: Utc::now(),
            details,
            sets: Vec::new(),
        }
    }

    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.details.as_ref().map(|d| d.category)
    }

    /// Only exercises with chosen details are written to the store.
    #[must_use]
    pub const fn is_persistable(&self) -> bool {
        self.details.is_some()
    }

    /// Appends an empty set shaped by the details' category.
    /// # Errors
    /// `ModelError::MissingDetails` when no exercise has been chosen.
    pub fn add_set(&mut self) -> Result<&mut S, ModelError> {
        let category = self.category().ok_or(ModelError::MissingDetails)?;
        self.sets.push(S::blank(category));
        let last = self.sets.len() - 1;
        Ok(&mut self.sets[last])
    }
}

impl ExerciseRecord {
    #[must_use]
    pub fn completed_sets(&self) -> usize {
        self.sets.iter().filter(|s| s.is_complete()).count()
    }

    /// Drops every set not marked complete. Returns how many were removed.
    pub fn prune_incomplete(&mut self) -> usize {
        let before = self.sets.len();
        self.sets.retain(SetRecord::is_complete);
        before - self.sets.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutEntry<S> {
    pub id: Option<ObjectId>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub exercises: Vec<ExerciseEntry<S>>,
}

pub type WorkoutRecord = WorkoutEntry<SetRecord>;
pub type WorkoutTemplate = WorkoutEntry<SetTemplate>;

impl<S: SetShape> WorkoutEntry<S> {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            created_at: Utc::now(),
            exercises: Vec::new(),
        }
    }

    /// Exercises in the order they were added, independent of storage order.
    #[must_use]
    pub fn ordered_exercises(&self) -> Vec<&ExerciseEntry<S>> {
        let mut ordered: Vec<_> = self.exercises.iter().collect();
        ordered.sort_by_key(|e| e.created_at);
        ordered
    }

    #[must_use]
    pub fn exercise(&self, id: &ObjectId) -> Option<&ExerciseEntry<S>> {
        self.exercises.iter().find(|e| e.id.as_ref() == Some(id))
    }

    pub fn exercise_mut(&mut self, id: &ObjectId) -> Option<&mut ExerciseEntry<S>> {
        self.exercises.iter_mut().find(|e| e.id.as_ref() == Some(id))
    }

    #[must_use]
    pub fn set_count(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }
}

impl WorkoutRecord {
    #[must_use]
    pub fn completed_set_count(&self) -> usize {
        self.exercises.iter().map(ExerciseRecord::completed_sets).sum()
    }
}

impl WorkoutTemplate {
    /// Builds an unsaved workout record from this plan. Sets carry the
    /// planned values and start incomplete; exercise order is preserved.
    #[must_use]
    pub fn instantiate(&self, name: &str) -> WorkoutRecord {
        let base = Utc::now();
        let exercises = self
            .ordered_exercises()
            .into_iter()
            .enumerate()
            .map(|(idx, planned)| ExerciseRecord {
                id: None,
                created_at: base + Duration::microseconds(idx as i64),
                details: planned.details.clone(),
                sets: planned.sets.iter().map(SetRecord::from).collect(),
            })
            .collect();
        WorkoutRecord {
            id: None,
            name: name.to_string(),
            created_at: base,
            exercises,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn filled(category: Category) -> SetRecord {
        let mut set = SetRecord::new(category);
        for field in category.required_fields() {
            match field {
                SetField::Weight => set.set_weight(Some(50.0)).unwrap(),
                SetField::Reps => set.set_reps(Some(5)).unwrap(),
                SetField::Rpe => set.set_rpe(Some(8.0)).unwrap(),
                SetField::Duration => set.set_duration_seconds(Some(90)).unwrap(),
                SetField::Distance => set.set_distance(Some(0.4)).unwrap(),
            }
        }
        set
    }

    fn clear(set: &mut SetRecord, field: SetField) {
        match field {
            SetField::Weight => set.set_weight(None).unwrap(),
            SetField::Reps => set.set_reps(None).unwrap(),
            SetField::Rpe => set.set_rpe(None).unwrap(),
            SetField::Duration => set.set_duration_seconds(None).unwrap(),
            SetField::Distance => set.set_distance(None).unwrap(),
        }
    }

    #[test]
    fn complete_rejected_until_required_fields_filled() {
        for category in Category::iter() {
            let mut set = SetRecord::new(category);
            assert!(!set.set_complete(true), "{category} accepted empty set");
            assert!(!set.is_complete());

            let mut set = filled(category);
            assert!(set.set_complete(true), "{category} rejected filled set");
            assert!(set.is_complete());
        }
    }

    #[test]
    fn clearing_any_required_field_uncompletes() {
        for category in Category::iter() {
            for field in category.required_fields() {
                let mut set = filled(category);
                assert!(set.set_complete(true));
                clear(&mut set, *field);
                assert!(!set.is_complete(), "{category}/{field} stayed complete");
            }
        }
    }

    #[test]
    fn clearing_optional_rpe_keeps_completion() {
        let mut set = filled(Category::WeightAndReps);
        set.set_rpe(Some(9.0)).unwrap();
        assert!(set.set_complete(true));
        set.set_rpe(None).unwrap();
        assert!(set.is_complete());
    }

    #[test]
    fn setting_field_outside_category_is_rejected() {
        let mut set = SetRecord::new(Category::Duration);
        let err = set.set_weight(Some(20.0)).unwrap_err();
        assert_eq!(
            err,
            ModelError::FieldNotApplicable {
                field: SetField::Weight,
                category: Category::Duration
            }
        );
        assert_eq!(set.values().weight(), None);
    }

    #[test]
    fn deserialising_restores_invariant() {
        let json = r#"{"id":"6f1c1f3e-2b7a-4f4e-9d56-2a0f4c1b9e11","values":{"category":"weightAndReps","weight":60.0},"complete":true}"#;
        let set: SetRecord = serde_json::from_str(json).unwrap();
        assert!(!set.is_complete());
        assert_eq!(set.values().weight(), Some(60.0));
    }

    #[test]
    fn category_string_round_trip() {
        for category in Category::iter() {
            let parsed: Category = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert_eq!(
            "DISTANCEANDWEIGHT".parse::<Category>().unwrap(),
            Category::DistanceAndWeight
        );
    }

    #[test]
    fn string_views_are_empty_when_unset() {
        let mut values = SetValues::empty(Category::DurationAndWeight);
        assert_eq!(values.duration_string(), "");
        assert_eq!(values.weight_string(), "");
        values.set_duration_seconds(Some(125)).unwrap();
        values.set_weight(Some(32.5)).unwrap();
        assert_eq!(values.duration_string(), "2:05");
        assert_eq!(values.weight_string(), "32.5");
    }

    #[test]
    fn summary_converts_to_imperial() {
        let mut values = SetValues::empty(Category::WeightAndReps);
        values.set_weight(Some(100.0)).unwrap();
        values.set_reps(Some(3)).unwrap();
        assert_eq!(values.summary(Units::Metric), "100.0 kg x 3");
        assert_eq!(values.summary(Units::Imperial), "220.5 lbs x 3");
    }

    #[test]
    fn add_set_requires_details() {
        let mut exercise = ExerciseRecord::new(None);
        assert_eq!(exercise.add_set().unwrap_err(), ModelError::MissingDetails);
    }

    #[test]
    fn prune_keeps_only_completed_sets() {
        let mut exercise = ExerciseRecord::new(None);
        let mut done = filled(Category::Reps);
        done.set_complete(true);
        exercise.sets = vec![done.clone(), SetRecord::new(Category::Reps), filled(Category::Reps)];
        assert_eq!(exercise.prune_incomplete(), 2);
        assert_eq!(exercise.sets, vec![done]);
    }

    #[test]
    fn copy_values_rejects_other_category() {
        let mut set = SetRecord::new(Category::Reps);
        let other = SetValues::empty(Category::Duration);
        assert!(matches!(
            set.copy_values_from(&other),
            Err(ModelError::CategoryMismatch { .. })
        ));
    }

    #[test]
    fn required_fields_are_carried() {
        for category in Category::iter() {
            for field in category.required_fields() {
                assert!(category.fields().contains(field), "{category} requires {field}");
            }
        }
        assert!(!Category::WeightAndReps.requires(SetField::Rpe));
        assert!(Category::WeightAndReps.fields().contains(&SetField::Rpe));
    }
}
