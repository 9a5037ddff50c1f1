//! Focused-window resolution
//!
//! Asks the compositor which window has focus so the injector can decide
//! whether the target wants a confirm keystroke. Tries hyprctl first, then
//! walks the sway tree. Resolution failure is not an error; it only
//! disables the confirm keystroke.

use std::process::Stdio;
use tokio::process::Command;

/// Resolve the app id of the currently focused window, if any
pub async fn focused_app_id() -> Option<String> {
    if let Some(id) = hyprland_focused().await {
        return Some(id);
    }
    sway_focused().await
}

/// Query Hyprland for the active window
async fn hyprland_focused() -> Option<String> {
    let output = Command::new("hyprctl")
        .args(["activewindow", "-j"])
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
    extract_hyprland_app_id(&json)
}

/// Query sway (or compatible compositors) for the focused node
async fn sway_focused() -> Option<String> {
    let output = Command::new("swaymsg")
        .args(["-t", "get_tree"])
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
    find_focused_app_id(&json)
}

/// Pull the class out of a hyprctl activewindow reply.
/// An empty reply ("{}") means no window is focused.
fn extract_hyprland_app_id(json: &serde_json::Value) -> Option<String> {
    json.get("class")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Depth-first search of the sway tree for the focused node's app id
fn find_focused_app_id(node: &serde_json::Value) -> Option<String> {
    if node.get("focused").and_then(|v| v.as_bool()) == Some(true) {
        // Wayland windows carry app_id; XWayland windows carry
        // window_properties.class instead
        if let Some(app_id) = node.get("app_id").and_then(|v| v.as_str()) {
            if !app_id.is_empty() {
                return Some(app_id.to_string());
            }
        }
        if let Some(class) = node
            .get("window_properties")
            .and_then(|p| p.get("class"))
            .and_then(|v| v.as_str())
        {
            return Some(class.to_string());
        }
        return None;
    }

    for key in ["nodes", "floating_nodes"] {
        if let Some(children) = node.get(key).and_then(|v| v.as_array()) {
            for child in children {
                if let Some(found) = find_focused_app_id(child) {
                    return Some(found);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_hyprland_app_id() {
        let json = serde_json::json!({
            "class": "Alacritty",
            "title": "~/projects"
        });
        assert_eq!(
            extract_hyprland_app_id(&json),
            Some("Alacritty".to_string())
        );
    }

    #[test]
    fn test_extract_hyprland_no_window() {
        let json = serde_json::json!({});
        assert_eq!(extract_hyprland_app_id(&json), None);
    }

    #[test]
    fn test_find_focused_in_sway_tree() {
        let json = serde_json::json!({
            "focused": false,
            "nodes": [
                {
                    "focused": false,
                    "nodes": [
                        { "focused": true, "app_id": "kitty", "nodes": [] }
                    ]
                },
                { "focused": false, "app_id": "firefox", "nodes": [] }
            ]
        });
        assert_eq!(find_focused_app_id(&json), Some("kitty".to_string()));
    }

    #[test]
    fn test_find_focused_in_floating_nodes() {
        let json = serde_json::json!({
            "focused": false,
            "nodes": [],
            "floating_nodes": [
                { "focused": true, "app_id": "foot", "nodes": [] }
            ]
        });
        assert_eq!(find_focused_app_id(&json), Some("foot".to_string()));
    }

    #[test]
    fn test_find_focused_xwayland_class() {
        let json = serde_json::json!({
            "focused": true,
            "app_id": null,
            "window_properties": { "class": "Alacritty" }
        });
        assert_eq!(find_focused_app_id(&json), Some("Alacritty".to_string()));
    }

    #[test]
    fn test_no_focused_node() {
        let json = serde_json::json!({
            "focused": false,
            "nodes": []
        });
        assert_eq!(find_focused_app_id(&json), None);
    }
}
