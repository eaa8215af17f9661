use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DaybotError;
use crate::tasks::ensure_parent_dir;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSet {
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub name: String,
    pub sets: Vec<WorkoutSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workout {
    pub id: String,
    /// `YYYY-MM-DD`; range filters compare lexically.
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub exercises: Vec<Exercise>,
    pub notes: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExerciseUpdate {
    pub date: String,
    pub exercise: String,
    pub sets: Vec<WorkoutSet>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExerciseRemoval {
    pub date: String,
    pub exercise: String,
}

/// Per-exercise first/last max-weight comparison over a date range.
#[derive(Debug, Clone, Serialize)]
pub struct ExerciseProgress {
    pub exercise: String,
    pub first_date: String,
    pub first_weight: f64,
    pub first_unit: String,
    pub last_date: String,
    pub last_weight: f64,
    pub last_unit: String,
    pub delta: f64,
    /// Percent change; only meaningful when first and last units match.
    pub pct: Option<f64>,
}

/// Per-chat strength workout log (`workouts_<chat>.json`).
pub struct WorkoutStore {
    path: PathBuf,
    workouts: Vec<Workout>,
}

impl WorkoutStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path)?;
        let workouts = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| DaybotError::Storage(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| DaybotError::Serialization(format!("{}: {e}", path.display())))?
        } else {
            Vec::new()
        };
        Ok(Self { path, workouts })
    }

    pub fn add_workout(
        &mut self,
        date: &str,
        exercises: Vec<Exercise>,
        notes: Option<String>,
        now: &str,
    ) -> Result<Workout> {
        let workout = Workout {
            id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            date: date.to_string(),
            kind: "strength".to_string(),
            exercises,
            notes: notes.unwrap_or_default(),
            created_at: now.to_string(),
        };
        self.workouts.push(workout.clone());
        self.save()?;
        Ok(workout)
    }

    pub fn list_workouts(&self, date_from: Option<&str>, date_to: Option<&str>) -> Vec<Workout> {
        if date_from.is_none() && date_to.is_none() {
            return self.workouts.clone();
        }
        self.workouts
            .iter()
            .filter(|w| {
                if let Some(from) = date_from {
                    if w.date.as_str() < from {
                        return false;
                    }
                }
                if let Some(to) = date_to {
                    if w.date.as_str() > to {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect()
    }

    /// Replace the sets of the most recently logged matching exercise,
    /// optionally restricted to one date; `notes` overwrites workout notes.
    pub fn update_exercise(
        &mut self,
        exercise: &str,
        sets: Vec<WorkoutSet>,
        date: Option<&str>,
        notes: Option<String>,
    ) -> Result<Option<ExerciseUpdate>> {
        let key = exercise.trim().to_lowercase();
        for workout in self.workouts.iter_mut().rev() {
            if let Some(date) = date {
                if workout.date != date {
                    continue;
                }
            }
            if let Some(entry) = workout
                .exercises
                .iter_mut()
                .find(|e| e.name.trim().to_lowercase() == key)
            {
                entry.sets = sets;
                let result = ExerciseUpdate {
                    date: workout.date.clone(),
                    exercise: entry.name.clone(),
                    sets: entry.sets.clone(),
                };
                if let Some(notes) = notes {
                    workout.notes = notes;
                }
                self.save()?;
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Remove the most recently logged matching exercise; a workout left
    /// without exercises is dropped entirely.
    pub fn remove_exercise(
        &mut self,
        exercise: &str,
        date: Option<&str>,
    ) -> Result<Option<ExerciseRemoval>> {
        let key = exercise.trim().to_lowercase();
        for idx in (0..self.workouts.len()).rev() {
            if let Some(date) = date {
                if self.workouts[idx].date != date {
                    continue;
                }
            }
            let Some(ex_idx) = self.workouts[idx]
                .exercises
                .iter()
                .rposition(|e| e.name.trim().to_lowercase() == key)
            else {
                continue;
            };
            let removed = self.workouts[idx].exercises.remove(ex_idx);
            let removal = ExerciseRemoval {
                date: self.workouts[idx].date.clone(),
                exercise: removed.name,
            };
            if self.workouts[idx].exercises.is_empty() {
                self.workouts.remove(idx);
            }
            self.save()?;
            return Ok(Some(removal));
        }
        Ok(None)
    }

    /// Progress per exercise in a date range: heaviest set per workout, then
    /// earliest-vs-latest comparison. Same-date ties keep the heavier weight;
    /// percent change only when the units match. Sorted by exercise name.
    pub fn progress(
        &self,
        date_from: Option<&str>,
        date_to: Option<&str>,
        exercise_filter: Option<&str>,
    ) -> Vec<ExerciseProgress> {
        let wanted: Vec<String> = exercise_filter
            .unwrap_or_default()
            .split(',')
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();

        let mut stats: BTreeMap<String, ExerciseProgress> = BTreeMap::new();
        for workout in self.list_workouts(date_from, date_to) {
            for exercise in &workout.exercises {
                let name = exercise.name.trim();
                if name.is_empty() {
                    continue;
                }
                let normalized = name.to_lowercase();
                if !wanted.is_empty() && !wanted.contains(&normalized) {
                    continue;
                }
                let Some((max_weight, max_unit)) = heaviest_set(&exercise.sets) else {
                    continue;
                };

                let entry = stats
                    .entry(normalized)
                    .or_insert_with(|| ExerciseProgress {
                        exercise: name.to_string(),
                        first_date: workout.date.clone(),
                        first_weight: max_weight,
                        first_unit: max_unit.clone(),
                        last_date: workout.date.clone(),
                        last_weight: max_weight,
                        last_unit: max_unit.clone(),
                        delta: 0.0,
                        pct: None,
                    });
                if workout.date < entry.first_date {
                    entry.first_date = workout.date.clone();
                    entry.first_weight = max_weight;
                    entry.first_unit = max_unit.clone();
                } else if workout.date == entry.first_date && max_weight > entry.first_weight {
                    entry.first_weight = max_weight;
                    entry.first_unit = max_unit.clone();
                }
                if workout.date > entry.last_date {
                    entry.last_date = workout.date.clone();
                    entry.last_weight = max_weight;
                    entry.last_unit = max_unit.clone();
                } else if workout.date == entry.last_date && max_weight > entry.last_weight {
                    entry.last_weight = max_weight;
                    entry.last_unit = max_unit;
                }
            }
        }

        let mut progress: Vec<ExerciseProgress> = stats.into_values().collect();
        for entry in &mut progress {
            entry.delta = entry.last_weight - entry.first_weight;
            entry.pct = if entry.first_weight > 0.0 && entry.first_unit == entry.last_unit {
                Some(entry.delta / entry.first_weight * 100.0)
            } else {
                None
            };
        }
        progress
    }

    fn save(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.workouts)
            .map_err(|e| DaybotError::Serialization(e.to_string()))?;
        fs::write(&self.path, raw)
            .map_err(|e| DaybotError::Storage(format!("write {}: {e}", self.path.display())))
    }
}

fn heaviest_set(sets: &[WorkoutSet]) -> Option<(f64, String)> {
    let mut max_weight = 0.0_f64;
    let mut max_unit = "kg".to_string();
    for set in sets {
        let Some(weight) = set.weight else { continue };
        if weight > max_weight {
            max_weight = weight;
            max_unit = set.unit.clone().unwrap_or_else(|| "kg".to_string());
        }
    }
    if max_weight > 0.0 {
        Some((max_weight, max_unit))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2024-01-01T08:00:00";

    fn set(reps: u32, weight: f64) -> WorkoutSet {
        WorkoutSet {
            reps: Some(reps),
            weight: Some(weight),
            unit: Some("kg".to_string()),
        }
    }

    fn bench(sets: Vec<WorkoutSet>) -> Exercise {
        Exercise {
            name: "Bench Press".to_string(),
            sets,
        }
    }

    #[test]
    fn progress_compares_first_and_last_max_weights() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = WorkoutStore::open(dir.path().join("workouts_42.json")).expect("store");
        store
            .add_workout("2024-01-01", vec![bench(vec![set(5, 60.0), set(5, 80.0)])], None, NOW)
            .expect("add");
        store
            .add_workout("2024-01-08", vec![bench(vec![set(5, 90.0)])], None, NOW)
            .expect("add");

        let progress = store.progress(None, None, None);
        assert_eq!(progress.len(), 1);
        let entry = &progress[0];
        assert_eq!(entry.exercise, "Bench Press");
        assert_eq!(entry.first_weight, 80.0);
        assert_eq!(entry.last_weight, 90.0);
        assert_eq!(entry.delta, 10.0);
        assert_eq!(entry.pct, Some(12.5));
    }

    #[test]
    fn progress_skips_pct_on_unit_mismatch() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = WorkoutStore::open(dir.path().join("workouts_42.json")).expect("store");
        store
            .add_workout(
                "2024-01-01",
                vec![bench(vec![WorkoutSet {
                    reps: Some(5),
                    weight: Some(135.0),
                    unit: Some("lb".to_string()),
                }])],
                None,
                NOW,
            )
            .expect("add");
        store
            .add_workout("2024-01-08", vec![bench(vec![set(5, 70.0)])], None, NOW)
            .expect("add");

        let progress = store.progress(None, None, None);
        assert_eq!(progress.len(), 1);
        assert!(progress[0].pct.is_none());
    }

    #[test]
    fn progress_honors_date_range_and_filter() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = WorkoutStore::open(dir.path().join("workouts_42.json")).expect("store");
        store
            .add_workout("2024-01-01", vec![bench(vec![set(5, 60.0)])], None, NOW)
            .expect("add");
        store
            .add_workout(
                "2024-01-05",
                vec![Exercise {
                    name: "Squat".to_string(),
                    sets: vec![set(5, 100.0)],
                }],
                None,
                NOW,
            )
            .expect("add");
        store
            .add_workout("2024-02-01", vec![bench(vec![set(5, 70.0)])], None, NOW)
            .expect("add");

        let january = store.progress(Some("2024-01-01"), Some("2024-01-31"), None);
        assert_eq!(january.len(), 2);

        let only_bench = store.progress(None, None, Some("bench press"));
        assert_eq!(only_bench.len(), 1);
        assert_eq!(only_bench[0].last_weight, 70.0);
    }

    #[test]
    fn update_exercise_targets_latest_match() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = WorkoutStore::open(dir.path().join("workouts_42.json")).expect("store");
        store
            .add_workout("2024-01-01", vec![bench(vec![set(5, 60.0)])], None, NOW)
            .expect("add");
        store
            .add_workout("2024-01-08", vec![bench(vec![set(5, 65.0)])], None, NOW)
            .expect("add");

        let updated = store
            .update_exercise("bench press", vec![set(3, 70.0)], None, Some("felt strong".into()))
            .expect("update")
            .expect("match");
        assert_eq!(updated.date, "2024-01-08");
        assert_eq!(updated.sets[0].weight, Some(70.0));

        let latest = store.list_workouts(Some("2024-01-08"), Some("2024-01-08"));
        assert_eq!(latest[0].notes, "felt strong");
        assert_eq!(latest[0].exercises[0].sets[0].weight, Some(70.0));

        assert!(store
            .update_exercise("deadlift", vec![set(1, 100.0)], None, None)
            .expect("update")
            .is_none());
    }

    #[test]
    fn remove_exercise_drops_emptied_workouts() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = WorkoutStore::open(dir.path().join("workouts_42.json")).expect("store");
        store
            .add_workout("2024-01-01", vec![bench(vec![set(5, 60.0)])], None, NOW)
            .expect("add");

        let removed = store
            .remove_exercise("Bench Press", None)
            .expect("remove")
            .expect("match");
        assert_eq!(removed.date, "2024-01-01");
        assert!(store.list_workouts(None, None).is_empty());
    }
}
