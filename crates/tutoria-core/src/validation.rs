//! Edit-boundary validation.
//!
//! The store accepts whatever it is given; forms call these checks first and
//! show the resulting `Validation` error inline. Each function returns a
//! trimmed copy of its input on success.

use crate::error::{Result, TutoriaError};
use crate::tutorial::{MAX_DESCRIPTION_CHARS, NewTutorial, TutorialPatch};
use crate::user::{NewUser, Role, UserPatch};

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TutoriaError::validation(field, "is required"));
    }
    Ok(trimmed.to_string())
}

fn check_description(description: &str) -> Result<String> {
    let trimmed = description.trim();
    if trimmed.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(TutoriaError::validation(
            "description",
            format!("must be at most {} characters", MAX_DESCRIPTION_CHARS),
        ));
    }
    Ok(trimmed.to_string())
}

fn check_images(images: &[String]) -> Result<Vec<String>> {
    let images: Vec<String> = images
        .iter()
        .map(|image| image.trim().to_string())
        .filter(|image| !image.is_empty())
        .collect();
    if images.is_empty() {
        return Err(TutoriaError::validation("images", "at least one image is required"));
    }
    Ok(images)
}

pub fn validate_sector_name(name: &str) -> Result<String> {
    required("name", name)
}

/// Trims the email. The password is returned as typed; it only has to be
/// non-blank.
pub fn validate_login(email: &str, password: &str) -> Result<(String, String)> {
    required("password", password)?;
    Ok((required("email", email)?, password.to_string()))
}

pub fn validate_new_user(user: &NewUser) -> Result<NewUser> {
    let sector_id = user
        .sector_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    if user.role == Role::User && sector_id.is_none() {
        return Err(TutoriaError::validation("sectorId", "regular users need a sector"));
    }
    Ok(NewUser {
        name: required("name", &user.name)?,
        email: required("email", &user.email)?,
        password: required("password", &user.password)?,
        role: user.role,
        sector_id,
    })
}

pub fn validate_user_patch(patch: &UserPatch) -> Result<UserPatch> {
    let mut clean = patch.clone();
    if let Some(name) = &patch.name {
        clean.name = Some(required("name", name)?);
    }
    if let Some(email) = &patch.email {
        clean.email = Some(required("email", email)?);
    }
    if let Some(password) = &patch.password {
        clean.password = Some(required("password", password)?);
    }
    if let Some(Some(sector_id)) = &patch.sector_id {
        let trimmed = sector_id.trim();
        clean.sector_id = Some((!trimmed.is_empty()).then(|| trimmed.to_string()));
    }
    Ok(clean)
}

pub fn validate_new_tutorial(tutorial: &NewTutorial) -> Result<NewTutorial> {
    Ok(NewTutorial {
        title: required("title", &tutorial.title)?,
        description: check_description(&tutorial.description)?,
        images: check_images(&tutorial.images)?,
        audio_url: tutorial
            .audio_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string),
        sector_id: required("sectorId", &tutorial.sector_id)?,
    })
}

pub fn validate_tutorial_patch(patch: &TutorialPatch) -> Result<TutorialPatch> {
    let mut clean = patch.clone();
    if let Some(title) = &patch.title {
        clean.title = Some(required("title", title)?);
    }
    if let Some(description) = &patch.description {
        clean.description = Some(check_description(description)?);
    }
    if let Some(images) = &patch.images {
        clean.images = Some(check_images(images)?);
    }
    if let Some(sector_id) = &patch.sector_id {
        clean.sector_id = Some(required("sectorId", sector_id)?);
    }
    Ok(clean)
}
