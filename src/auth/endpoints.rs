//! URL endpoints for Google's OAuth2 installed-app flow.

/// Read-only access to items the user picks in the Photos Picker.
pub const PICKER_SCOPE: &str = "https://www.googleapis.com/auth/photospicker.mediaitems.readonly";

/// Read-only access to the Photos Library (albums and their items).
pub const LIBRARY_SCOPE: &str = "https://www.googleapis.com/auth/photoslibrary.readonly";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub authorize: String,
    pub token: String,
}

impl Endpoints {
    pub fn google() -> Self {
        Self {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::google()
    }
}
