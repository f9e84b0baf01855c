//! Status-bar menu
//!
//! Mirrors the hotkey vocabulary and adds direct opacity and size presets.
//! Menu clicks are mapped to `ControlEvent`s; checkbox and label state is
//! synced back from the controller's published snapshot.

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;
use tray_icon::{
    menu::{CheckMenuItem, Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem, Submenu},
    Icon, TrayIcon, TrayIconBuilder,
};

use crate::controller::StateSnapshot;
use crate::shared::ControlEvent;

/// Opacity presets offered in the submenu, in percent
const OPACITY_PRESETS: [u32; 5] = [20, 40, 60, 80, 100];

/// Size presets offered in the submenu, in percent of the base window
const SIZE_PRESETS: [u32; 5] = [50, 75, 100, 150, 200];

/// Status-bar icon with its menu
pub struct TrayMenu {
    _tray: TrayIcon,
    toggle_item: MenuItem,
    presentation_item: CheckMenuItem,
    start_item: MenuItem,
    stop_item: MenuItem,
    quit_item: MenuItem,
    opacity_items: Vec<(MenuId, f32)>,
    size_items: Vec<(MenuId, f32)>,
    events_tx: Sender<ControlEvent>,
    snapshot: Arc<RwLock<StateSnapshot>>,
}

impl TrayMenu {
    pub fn new(
        events_tx: Sender<ControlEvent>,
        snapshot: Arc<RwLock<StateSnapshot>>,
    ) -> Result<Self> {
        let menu = Menu::new();

        let toggle_item = MenuItem::new("Show/Hide Overlay", true, None);
        menu.append(&toggle_item)
            .context("Failed to build tray menu")?;

        let presentation_item = CheckMenuItem::new(
            "Hide During Screen Sharing",
            true,
            snapshot.read().presentation_mode,
            None,
        );
        menu.append(&presentation_item)?;

        let opacity_menu = Submenu::new("Opacity", true);
        let mut opacity_items = Vec::new();
        for level in OPACITY_PRESETS {
            let item = MenuItem::new(format!("{level}% Opacity"), true, None);
            opacity_menu.append(&item)?;
            opacity_items.push((item.id().clone(), level as f32 / 100.0));
        }
        menu.append(&opacity_menu)?;

        let size_menu = Submenu::new("Size", true);
        let mut size_items = Vec::new();
        for level in SIZE_PRESETS {
            let item = MenuItem::new(format!("{level}% Size"), true, None);
            size_menu.append(&item)?;
            size_items.push((item.id().clone(), level as f32 / 100.0));
        }
        menu.append(&size_menu)?;

        menu.append(&PredefinedMenuItem::separator())?;

        let start_item = MenuItem::new("Start Session", true, None);
        menu.append(&start_item)?;
        let stop_item = MenuItem::new("Stop Session", false, None);
        menu.append(&stop_item)?;

        menu.append(&PredefinedMenuItem::separator())?;

        let quit_item = MenuItem::new("Quit", true, None);
        menu.append(&quit_item)?;

        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("Realtime Overlay")
            .with_icon(tray_icon_image()?)
            .build()
            .context("Failed to create status bar item")?;

        info!("Status bar menu created");

        Ok(Self {
            _tray: tray,
            toggle_item,
            presentation_item,
            start_item,
            stop_item,
            quit_item,
            opacity_items,
            size_items,
            events_tx,
            snapshot,
        })
    }

    /// Drain pending menu clicks into the controller channel
    pub fn poll_events(&self) {
        while let Ok(event) = MenuEvent::receiver().try_recv() {
            if let Some(control_event) = self.map_menu_id(event.id()) {
                let _ = self.events_tx.send(control_event);
            }
        }
    }

    fn map_menu_id(&self, id: &MenuId) -> Option<ControlEvent> {
        if id == self.toggle_item.id() {
            return Some(ControlEvent::ToggleVisibility);
        }
        if id == self.presentation_item.id() {
            // The checkbox has already flipped when the click arrives; push
            // its new state rather than a toggle so the two cannot diverge
            return Some(ControlEvent::SetPresentationMode(
                self.presentation_item.is_checked(),
            ));
        }
        if id == self.start_item.id() {
            return Some(ControlEvent::StartSession);
        }
        if id == self.stop_item.id() {
            return Some(ControlEvent::StopSession);
        }
        if id == self.quit_item.id() {
            return Some(ControlEvent::Quit);
        }
        if let Some((_, opacity)) = self.opacity_items.iter().find(|(item_id, _)| item_id == id) {
            return Some(ControlEvent::SetOpacity(*opacity));
        }
        self.size_items
            .iter()
            .find(|(item_id, _)| item_id == id)
            .map(|(_, scale)| ControlEvent::SetScale(*scale))
    }

    /// Reflect controller state in the menu (checkbox, labels, enabled items)
    pub fn sync(&self) {
        let snapshot = self.snapshot.read();
        self.presentation_item
            .set_checked(snapshot.presentation_mode);
        self.toggle_item.set_text(if snapshot.user_visible {
            "Hide Overlay"
        } else {
            "Show Overlay"
        });
        self.start_item.set_enabled(!snapshot.session_active);
        self.stop_item.set_enabled(snapshot.session_active);
    }
}

/// A plain rounded-dot icon rendered in memory; no bundled assets
fn tray_icon_image() -> Result<Icon> {
    const SIZE: u32 = 32;
    let center = (SIZE / 2) as i32;
    let radius = (SIZE / 2 - 2) as i32;

    let mut rgba = Vec::with_capacity((SIZE * SIZE * 4) as usize);
    for y in 0..SIZE as i32 {
        for x in 0..SIZE as i32 {
            let dx = x - center;
            let dy = y - center;
            let inside = dx * dx + dy * dy <= radius * radius;
            let alpha = if inside { 255 } else { 0 };
            rgba.extend_from_slice(&[230, 230, 230, alpha]);
        }
    }

    Icon::from_rgba(rgba, SIZE, SIZE).context("Failed to build tray icon image")
}
