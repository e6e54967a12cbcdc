use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::error::{ExtractError, Result};

/// Field name → extracted value for one course.
pub type CourseFields = BTreeMap<String, String>;

/// The run's output: course id → field map.
///
/// Only the outer map is shared. A course task builds its [`CourseFields`]
/// privately and hands it over once through [`ResultStore::insert`], so no
/// two tasks ever write the same inner map.
#[derive(Debug, Default)]
pub struct ResultStore {
    courses: RwLock<HashMap<String, CourseFields>>,
}

impl ResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a course's fields. Each id may be claimed once per run.
    pub fn insert(&self, course_id: &str, fields: CourseFields) -> Result<()> {
        let mut courses = self.courses.write().unwrap_or_else(PoisonError::into_inner);
        if courses.contains_key(course_id) {
            return Err(ExtractError::DuplicateCourse {
                id: course_id.to_string(),
            });
        }
        courses.insert(course_id.to_string(), fields);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, course_id: &str) -> Option<CourseFields> {
        self.courses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(course_id)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, course_id: &str) -> bool {
        self.courses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(course_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.courses.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Course ids, sorted.
    #[must_use]
    pub fn course_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .courses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Sorted copy of the whole store.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, CourseFields> {
        self.courses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Consume the store into a sorted map.
    #[must_use]
    pub fn into_courses(self) -> BTreeMap<String, CourseFields> {
        self.courses
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    fn fields(pairs: &[(&str, &str)]) -> CourseFields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn insert_and_get() {
        let store = ResultStore::new();
        store
            .insert("CS101", fields(&[("id", "CS101"), ("title", "Intro")]))
            .unwrap();
        let got = store.get("CS101").unwrap();
        assert_eq!(got.get("title").map(String::as_str), Some("Intro"));
        assert!(store.contains("CS101"));
        assert!(!store.contains("CS102"));
    }

    #[test]
    fn second_claim_is_rejected() {
        let store = ResultStore::new();
        store.insert("CS101", fields(&[("title", "Intro")])).unwrap();
        let err = store.insert("CS101", fields(&[("title", "Other")])).unwrap_err();
        assert!(matches!(err, ExtractError::DuplicateCourse { id } if id == "CS101"));
        assert_eq!(store.get("CS101").unwrap()["title"], "Intro");
    }

    #[test]
    fn concurrent_inserts_of_distinct_ids() {
        let store = ResultStore::new();
        (0..200).into_par_iter().for_each(|i| {
            store
                .insert(&format!("C{i:03}"), fields(&[("n", &i.to_string())]))
                .unwrap();
        });
        assert_eq!(store.len(), 200);
        let ids = store.course_ids();
        assert_eq!(ids.first().map(String::as_str), Some("C000"));
        assert_eq!(ids.last().map(String::as_str), Some("C199"));
    }

    #[test]
    fn into_courses_is_sorted() {
        let store = ResultStore::new();
        store.insert("b", CourseFields::new()).unwrap();
        store.insert("a", CourseFields::new()).unwrap();
        let keys: Vec<_> = store.into_courses().into_keys().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
