//! Overlay Presentation Layer
//!
//! A transparent click-through window (egui_overlay) showing the streamed
//! transcript. The overlay consumes idempotent `RenderCommand`s and gives no
//! feedback to the controller; visibility, opacity and scale are whatever the
//! last command said.

use crossbeam_channel::Receiver;
use egui::{Align2, Color32, FontId, RichText, Rounding, Vec2};
use egui_overlay::{
    egui_render_three_d::ThreeDBackend, egui_window_glfw_passthrough::GlfwBackend, EguiOverlay,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::OverlaySettings;
use crate::shared::RenderCommand;

/// Sealed transcript blocks kept for scrollback
const MAX_BLOCKS: usize = 50;

/// One sealed entry in the transcript
#[derive(Debug, Clone, PartialEq)]
enum TranscriptBlock {
    /// A completed model response
    Response(String),
    /// A status line (connection state, errors)
    Notice(String),
}

/// Everything the overlay window needs to draw a frame
#[derive(Debug, Clone)]
pub struct OverlayView {
    visible: bool,
    opacity: f32,
    scale: f32,
    base_width: f32,
    base_height: f32,
    blocks: Vec<TranscriptBlock>,
    /// Response text still streaming in
    current: String,
    shutdown: bool,
}

impl OverlayView {
    fn new(settings: &OverlaySettings) -> Self {
        Self {
            visible: true,
            opacity: settings.opacity,
            scale: settings.scale,
            base_width: settings.width,
            base_height: settings.height,
            blocks: Vec::new(),
            current: String::new(),
            shutdown: false,
        }
    }

    /// Apply one render command; repeat applications are harmless
    fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::SetVisible(visible) => self.visible = visible,
            RenderCommand::SetOpacity(opacity) => self.opacity = opacity,
            RenderCommand::SetScale(scale) => self.scale = scale,
            RenderCommand::AppendDelta(text) => self.current.push_str(&text),
            RenderCommand::EndResponse => {
                if !self.current.is_empty() {
                    let text = std::mem::take(&mut self.current);
                    self.push_block(TranscriptBlock::Response(text));
                }
            }
            RenderCommand::Notice(text) => self.push_block(TranscriptBlock::Notice(text)),
            RenderCommand::Clear => {
                self.blocks.clear();
                self.current.clear();
            }
            RenderCommand::Shutdown => self.shutdown = true,
        }
    }

    fn push_block(&mut self, block: TranscriptBlock) {
        self.blocks.push(block);
        if self.blocks.len() > MAX_BLOCKS {
            self.blocks.remove(0);
        }
    }
}

/// Overlay window manager
pub struct OverlayManager {
    view: Arc<RwLock<OverlayView>>,
    commands_rx: Receiver<RenderCommand>,
}

impl OverlayManager {
    pub fn new(settings: &OverlaySettings, commands_rx: Receiver<RenderCommand>) -> Self {
        Self {
            view: Arc::new(RwLock::new(OverlayView::new(settings))),
            commands_rx,
        }
    }

    /// Run the overlay event loop (blocking)
    ///
    /// Must be called from the main thread. `tick` runs once per frame on the
    /// main thread; input sources that need main-thread polling (hotkeys,
    /// status bar menu) hook in here.
    pub fn run(self, tick: impl FnMut() + 'static) {
        info!("Starting overlay...");

        let app = OverlayWindow {
            view: self.view,
            commands_rx: self.commands_rx,
            tick: Box::new(tick),
        };

        egui_overlay::start(app);
    }
}

/// The egui overlay application
struct OverlayWindow {
    view: Arc<RwLock<OverlayView>>,
    commands_rx: Receiver<RenderCommand>,
    tick: Box<dyn FnMut()>,
}

impl EguiOverlay for OverlayWindow {
    fn gui_run(
        &mut self,
        egui_ctx: &egui::Context,
        _default_gfx_backend: &mut ThreeDBackend,
        glfw_backend: &mut GlfwBackend,
    ) {
        (self.tick)();

        // Apply pending render commands
        {
            let mut view = self.view.write();
            while let Ok(command) = self.commands_rx.try_recv() {
                view.apply(command);
            }
        }

        let view = self.view.read().clone();

        if view.shutdown {
            glfw_backend.window.set_should_close(true);
            return;
        }

        if !view.visible {
            // Check back for commands without burning a core
            egui_ctx.request_repaint_after(Duration::from_millis(100));
            return;
        }

        let panel_width = view.base_width * view.scale;
        let panel_height = view.base_height * view.scale;

        let bg_color = Color32::from_rgba_unmultiplied(
            0,
            0,
            0,
            (0.5 * view.opacity * 255.0) as u8,
        );
        let text_color = Color32::from_rgba_unmultiplied(
            255,
            255,
            255,
            (view.opacity * 255.0) as u8,
        );
        let notice_color = Color32::from_rgba_unmultiplied(
            200,
            200,
            200,
            (0.8 * view.opacity * 255.0) as u8,
        );
        let font = FontId::proportional(18.0 * view.scale);
        let notice_font = FontId::proportional(14.0 * view.scale);

        egui::Area::new(egui::Id::new("transcript_overlay"))
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(egui_ctx, |ui| {
                egui::Frame::none()
                    .fill(bg_color)
                    .rounding(Rounding::same(10.0))
                    .inner_margin(12.0)
                    .show(ui, |ui| {
                        ui.set_width(panel_width);
                        ui.set_height(panel_height);

                        egui::ScrollArea::vertical()
                            .stick_to_bottom(true)
                            .show(ui, |ui| {
                                for block in &view.blocks {
                                    match block {
                                        TranscriptBlock::Response(text) => {
                                            ui.label(
                                                RichText::new(text)
                                                    .color(text_color)
                                                    .font(font.clone()),
                                            );
                                            ui.add_space(8.0);
                                        }
                                        TranscriptBlock::Notice(text) => {
                                            ui.label(
                                                RichText::new(text)
                                                    .color(notice_color)
                                                    .font(notice_font.clone()),
                                            );
                                            ui.add_space(4.0);
                                        }
                                    }
                                }
                                if !view.current.is_empty() {
                                    ui.label(
                                        RichText::new(&view.current)
                                            .color(text_color)
                                            .font(font.clone()),
                                    );
                                }
                            });
                    });
            });

        // Keep streaming text moving
        egui_ctx.request_repaint_after(Duration::from_millis(50));
    }
}
