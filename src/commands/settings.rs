use waveget_core::models::settings::AppSettings;

use crate::storage::config;
use crate::AppState;

pub fn get_settings(state: &AppState) -> Result<AppSettings, String> {
    Ok(state.load_settings())
}

/// Applies `partial`, a JSON object holding only the fields to change.
pub fn update_settings(state: &AppState, partial: &str) -> Result<AppSettings, String> {
    let current = state.load_settings();

    let patch: serde_json::Value =
        serde_json::from_str(partial).map_err(|e| format!("Invalid JSON: {}", e))?;
    if !patch.is_object() {
        return Err("Invalid JSON: expected an object".into());
    }

    let mut current_val =
        serde_json::to_value(&current).map_err(|e| format!("Serialize: {}", e))?;
    merge_json(&mut current_val, &patch);
    let updated: AppSettings =
        serde_json::from_value(current_val).map_err(|e| format!("Deserialize: {}", e))?;

    config::save_settings(state.paths.as_ref(), &updated).map_err(|e| format!("Save: {}", e))?;
    tracing::info!("Settings updated");
    Ok(updated)
}

pub fn reset_settings(state: &AppState) -> Result<AppSettings, String> {
    let defaults = AppSettings::default();
    config::save_settings(state.paths.as_ref(), &defaults).map_err(|e| format!("Save: {}", e))?;
    Ok(defaults)
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            match base_obj.get_mut(key) {
                Some(existing) if value.is_object() && existing.is_object() => {
                    merge_json(existing, value)
                }
                _ => {
                    base_obj.insert(key.clone(), value.clone());
                }
            }
        }
    }
}
