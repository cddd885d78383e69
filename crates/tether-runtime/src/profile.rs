#![forbid(unsafe_code)]

//! User-profile domain: the record the demo edits optimistically.

use std::fmt;

use crate::backend::{Backend, Probe, SimulatedBackend};
use crate::error::ScopeError;
use crate::optimistic::{self, Optimistic, Patchable, PendingUpdate, UpdateRequest};
use crate::reactive::{Dispatcher, Reducer};

/// A user's public profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserProfile {
    pub name: String,
    pub tagline: String,
    pub bio: String,
    /// The edit form is open.
    pub editing: bool,
}

impl UserProfile {
    #[must_use]
    pub fn new(name: impl Into<String>, tagline: impl Into<String>, bio: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tagline: tagline.into(),
            bio: bio.into(),
            editing: false,
        }
    }

    #[must_use]
    pub fn with_editing(&self, editing: bool) -> Self {
        Self {
            editing,
            ..self.clone()
        }
    }
}

/// Fields to overwrite. `None` leaves a field as it is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub tagline: Option<String>,
    pub bio: Option<String>,
}

impl ProfilePatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn tagline(mut self, tagline: impl Into<String>) -> Self {
        self.tagline = Some(tagline.into());
        self
    }

    #[must_use]
    pub fn bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.tagline.is_none() && self.bio.is_none()
    }

    /// Fields this patch touches, in display order.
    pub fn fields(&self) -> impl Iterator<Item = ProfileField> + '_ {
        ProfileField::ALL
            .into_iter()
            .filter(|field| field.read(self).is_some())
    }

    /// Short description for request metadata, e.g. "Update name, bio".
    #[must_use]
    pub fn describe(&self) -> String {
        let fields: Vec<&str> = self.fields().map(ProfileField::as_str).collect();
        if fields.is_empty() {
            "Update profile".to_string()
        } else {
            format!("Update {}", fields.join(", "))
        }
    }
}

impl Patchable for UserProfile {
    type Patch = ProfilePatch;

    fn apply(&self, patch: &ProfilePatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name.clone_from(name);
        }
        if let Some(tagline) = &patch.tagline {
            next.tagline.clone_from(tagline);
        }
        if let Some(bio) = &patch.bio {
            next.bio.clone_from(bio);
        }
        next
    }
}

/// A profile field the backend can be told to watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProfileField {
    Name,
    #[default]
    Tagline,
    Bio,
}

impl ProfileField {
    pub const ALL: [Self; 3] = [Self::Name, Self::Tagline, Self::Bio];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Tagline => "tagline",
            Self::Bio => "bio",
        }
    }

    /// The value `patch` sets for this field.
    #[must_use]
    pub fn read(self, patch: &ProfilePatch) -> Option<&str> {
        match self {
            Self::Name => patch.name.as_deref(),
            Self::Tagline => patch.tagline.as_deref(),
            Self::Bio => patch.bio.as_deref(),
        }
    }

    /// Probe for a [`SimulatedBackend`] watching this field.
    #[must_use]
    pub fn probe(self) -> Probe<ProfilePatch> {
        match self {
            Self::Name => probe_name,
            Self::Tagline => probe_tagline,
            Self::Bio => probe_bio,
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn probe_name(patch: &ProfilePatch) -> Option<&str> {
    ProfileField::Name.read(patch)
}

fn probe_tagline(patch: &ProfilePatch) -> Option<&str> {
    ProfileField::Tagline.read(patch)
}

fn probe_bio(patch: &ProfilePatch) -> Option<&str> {
    ProfileField::Bio.read(patch)
}

impl SimulatedBackend<UserProfile> {
    /// A profile backend that refuses patches setting `field` to `"fail"`.
    #[must_use]
    pub fn for_profiles(field: ProfileField) -> Self {
        Self::new(field.probe())
    }
}

/// Local edit-form transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileAction {
    BeginEdit,
    CancelEdit,
    /// Close the form because its contents were submitted.
    FinishEdit,
}

impl Reducer<ProfileAction> for Optimistic<UserProfile> {
    fn reduce(&self, action: ProfileAction) -> Self {
        let editing = matches!(action, ProfileAction::BeginEdit);
        self.map_confirmed(|profile| profile.with_editing(editing))
    }
}

/// Close the edit form and submit `patch` optimistically.
///
/// # Errors
///
/// Same as [`optimistic::update`].
pub fn submit_edit<B>(
    dispatcher: &Dispatcher<Optimistic<UserProfile>>,
    current: &Optimistic<UserProfile>,
    patch: ProfilePatch,
    backend: &B,
) -> Result<PendingUpdate, ScopeError>
where
    B: Backend<UserProfile> + ?Sized,
{
    dispatcher.send(ProfileAction::FinishEdit)?;
    let current = current.reduce(ProfileAction::FinishEdit);
    let request = UpdateRequest::new(patch.clone()).describe(patch.describe());
    optimistic::update(dispatcher, &current, request, backend)
}
