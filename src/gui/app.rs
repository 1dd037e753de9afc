use crate::core::{AppConfig, Mark};
use crate::gui::timeline::show_timeline;
use crate::hotkeys::{KeyAction, KeyBindings, KEY_HELP};
use crate::review::{frame_time, Flow, Player, ReviewEvent, Reviewer};
use crate::video::{render_summary, FfmpegPlayer, RenderReport};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Instant;

/// Summary rendering running on a background thread.
pub struct PlotJob {
    receiver: mpsc::Receiver<anyhow::Result<RenderReport>>,
    started: Instant,
}

pub struct ReviewApp {
    pub config: AppConfig,
    pub reviewer: Reviewer<FfmpegPlayer>,
    pub key_bindings: KeyBindings,
    pub video_root: PathBuf,
    pub plot_job: Option<PlotJob>,
    pub show_trial_list: bool,
    pub exit_requested: bool,
}

impl ReviewApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: AppConfig,
        mut reviewer: Reviewer<FfmpegPlayer>,
        video_root: PathBuf,
    ) -> Self {
        let mut visuals = egui::Visuals::dark();
        visuals.override_text_color = Some(egui::Color32::WHITE);
        cc.egui_ctx.set_visuals(visuals);

        reviewer.start();

        Self {
            key_bindings: KeyBindings::new(&config),
            config,
            reviewer,
            video_root,
            plot_job: None,
            show_trial_list: false,
            exit_requested: false,
        }
    }

    fn handle_action(&mut self, ctx: &egui::Context, action: KeyAction) {
        match action {
            KeyAction::Review(event) => self.send(ctx, event),
            KeyAction::GeneratePlots => self.start_plot_job(),
            KeyAction::ToggleTrialList => self.show_trial_list = !self.show_trial_list,
        }
    }

    fn send(&mut self, ctx: &egui::Context, event: ReviewEvent) {
        if self.exit_requested {
            return;
        }
        if self.reviewer.handle(event) == Flow::Exit {
            log::info!("Exiting review session");
            self.exit_requested = true;
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn start_plot_job(&mut self) {
        if self.plot_job.is_some() {
            self.reviewer.report("Summary plots are already being generated", false);
            return;
        }

        // Plots and results.csv should agree
        self.reviewer.merge_now();

        let session_dir = self.reviewer.store().dir().to_path_buf();
        let video_root = self.video_root.clone();
        let (before, after) = (self.config.frames_before, self.config.frames_after);
        let (tx, rx) = mpsc::channel();

        log::info!("Generating summary plots for {}", session_dir.display());
        std::thread::spawn(move || {
            let result = render_summary(&session_dir, &video_root, before, after);
            let _ = tx.send(result);
        });

        self.plot_job = Some(PlotJob {
            receiver: rx,
            started: Instant::now(),
        });
        self.reviewer.report("Generating summary plots...", false);
    }

    fn poll_plot_job(&mut self) {
        let Some(job) = &self.plot_job else {
            return;
        };
        let result = match job.receiver.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return,
            Err(mpsc::TryRecvError::Disconnected) => Err(anyhow::anyhow!("plot generation stopped unexpectedly")),
        };
        let elapsed = job.started.elapsed();
        self.plot_job = None;

        match result {
            Ok(report) => {
                let mut text = format!(
                    "Wrote {} summary plots in {:.1}s",
                    report.written.len(),
                    elapsed.as_secs_f64()
                );
                if !report.skipped.is_empty() {
                    let names: Vec<&str> = report.skipped.iter().map(|s| s.trial.as_str()).collect();
                    text.push_str(&format!(", skipped {}: {}", names.len(), names.join(", ")));
                }
                self.reviewer.report(text, !report.skipped.is_empty());
            }
            Err(e) => {
                log::error!("Summary plots failed: {:#}", e);
                self.reviewer.report(format!("Summary plots failed: {:#}", e), true);
            }
        }
    }

    fn show_top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("Session", |ui| {
                    if ui.button("Generate summary plots").clicked() {
                        self.start_plot_job();
                        ui.close_menu();
                    }
                    if ui.checkbox(&mut self.show_trial_list, "Show trial list").clicked() {
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Save and quit").clicked() {
                        self.send(ctx, ReviewEvent::Quit);
                        ui.close_menu();
                    }
                });

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(progress_text(
                        self.reviewer.position(),
                        self.reviewer.trial_count(),
                        self.reviewer.marked_count(),
                    ));
                    ui.separator();
                    ui.label(format!("Session: {}", self.reviewer.store().name()));
                });
            });
        });
    }

    fn show_instructions(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("instructions")
            .default_width(260.0)
            .resizable(false)
            .show(ctx, |ui| {
                ui.heading("Controls");
                egui::Grid::new("key_help").num_columns(2).striped(true).show(ui, |ui| {
                    for (keys, action) in KEY_HELP {
                        ui.monospace(*keys);
                        ui.label(*action);
                        ui.end_row();
                    }
                });

                ui.add_space(12.0);
                ui.heading("Current trial");
                match self.reviewer.trial_info() {
                    Some(info) => {
                        ui.label(format!("Video: {}", info.relative_path));
                        ui.label(format!("Group: {}", info.group));
                    }
                    None => {
                        ui.label("Blind mode: trial details hidden");
                    }
                }
                ui.label(format!("Saved: {}", mark_text(self.reviewer.current_mark())));
            });
    }

    fn show_trial_panel(&mut self, ctx: &egui::Context) {
        let mut selected = None;
        egui::SidePanel::right("trial_list")
            .default_width(240.0)
            .show(ctx, |ui| {
                ui.heading("Trials");
                egui::ScrollArea::vertical().show(ui, |ui| {
                    for (index, trial) in self.reviewer.trials().iter().enumerate() {
                        let label = trial_label(
                            index,
                            &trial.relative_path,
                            self.reviewer.is_blind(),
                            self.reviewer.mark_at(index),
                        );
                        let current = index == self.reviewer.position();
                        if ui.selectable_label(current, label).clicked() {
                            selected = Some(index);
                        }
                    }
                });
            });
        if let Some(index) = selected {
            self.send(ctx, ReviewEvent::Select(index));
        }
    }

    fn show_status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Status:");
                match self.reviewer.status() {
                    Some(status) if status.is_error => {
                        ui.colored_label(egui::Color32::from_rgb(255, 90, 90), &status.text);
                    }
                    Some(status) => {
                        ui.label(&status.text);
                    }
                    None => {
                        ui.label(self.reviewer.player().state().display_text());
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.monospace(format!(
                        "frame {}  |  {:.3} fps  |  {:.2}x",
                        self.reviewer.current_frame(),
                        self.reviewer.fps(),
                        self.reviewer.speed()
                    ));
                    if self.plot_job.is_some() {
                        ui.spinner();
                    }
                });
            });
        });
    }

    fn show_player(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let video_height = (ui.available_height() - 110.0).max(100.0);
            let video_size = egui::Vec2::new(ui.available_width(), video_height);

            match self.reviewer.player_mut().texture() {
                Some(texture) => {
                    ui.allocate_ui(video_size, |ui| {
                        ui.centered_and_justified(|ui| {
                            ui.add(
                                egui::Image::new(egui::load::SizedTexture::from_handle(&texture))
                                    .max_size(video_size)
                                    .maintain_aspect_ratio(true),
                            );
                        });
                    });
                }
                None => {
                    let (rect, _) = ui.allocate_exact_size(video_size, egui::Sense::hover());
                    ui.painter().rect_filled(rect, egui::Rounding::same(4.0), egui::Color32::BLACK);
                    ui.painter().text(
                        rect.center(),
                        egui::Align2::CENTER_CENTER,
                        "Loading frame...",
                        egui::FontId::proportional(16.0),
                        egui::Color32::GRAY,
                    );
                }
            }

            let player = self.reviewer.player();
            let current = player.time();
            let duration = player.duration();
            let mark_time = self
                .reviewer
                .current_mark()
                .and_then(|mark| mark.frame())
                .map(|frame| frame_time(frame, self.reviewer.fps()));
            if let Some(seek) = show_timeline(ui, current, duration, mark_time) {
                self.send(ctx, ReviewEvent::SeekTo(seek));
            }

            ui.add_space(6.0);
            ui.horizontal(|ui| {
                if ui.button("⏮ Previous").clicked() {
                    self.send(ctx, ReviewEvent::Previous);
                }
                let play_label = if self.reviewer.player().is_playing() { "⏸ Pause" } else { "▶ Play" };
                if ui.button(play_label).clicked() {
                    self.send(ctx, ReviewEvent::TogglePlay);
                }
                let can_mark = self.reviewer.can_mark();
                if ui.add_enabled(can_mark, egui::Button::new("✔ Mark frame")).clicked() {
                    self.send(ctx, ReviewEvent::MarkAndAdvance);
                }
                if ui.add_enabled(can_mark, egui::Button::new("✖ No frame")).clicked() {
                    self.send(ctx, ReviewEvent::MarkNoFrame);
                }
                if ui.button("Next ⏭").clicked() {
                    self.send(ctx, ReviewEvent::Next);
                }
                if ui.button("Next unmarked").clicked() {
                    self.send(ctx, ReviewEvent::NextUnmarked);
                }
            });
        });
    }

    fn show_completion_dialog(&mut self, ctx: &egui::Context) {
        let mut choice = None;
        egui::Window::new("Review complete")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(format!(
                    "{} of {} trials marked.",
                    self.reviewer.marked_count(),
                    self.reviewer.trial_count()
                ));
                if let Some(merge) = self.reviewer.last_merge() {
                    ui.label(format!("Results saved to {}", merge.path.display()));
                    if !merge.unmatched.is_empty() {
                        ui.colored_label(
                            egui::Color32::YELLOW,
                            format!("{} marks have no matching video", merge.unmatched.len()),
                        );
                    }
                }
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Continue reviewing").clicked() {
                        choice = Some(KeyAction::Review(ReviewEvent::ContinueReviewing));
                    }
                    if ui
                        .add_enabled(self.plot_job.is_none(), egui::Button::new("Generate summary plots"))
                        .clicked()
                    {
                        choice = Some(KeyAction::GeneratePlots);
                    }
                    if ui.button("Quit").clicked() {
                        choice = Some(KeyAction::Review(ReviewEvent::Quit));
                    }
                });
            });
        if let Some(action) = choice {
            self.handle_action(ctx, action);
        }
    }
}

impl eframe::App for ReviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.viewport().close_requested()) && !self.exit_requested {
            // Window closed directly: still persist the position
            self.send(ctx, ReviewEvent::Quit);
        }

        self.reviewer.player_mut().update(ctx);
        for action in self.key_bindings.collect(ctx) {
            self.handle_action(ctx, action);
        }
        self.poll_plot_job();

        self.show_top_bar(ctx);
        self.show_status_bar(ctx);
        self.show_instructions(ctx);
        if self.show_trial_list {
            self.show_trial_panel(ctx);
        }
        self.show_player(ctx);

        if self.reviewer.is_done() {
            self.show_completion_dialog(ctx);
        }

        if self.plot_job.is_some() {
            ctx.request_repaint_after(std::time::Duration::from_millis(200));
        }
    }
}

pub fn progress_text(position: usize, count: usize, marked: usize) -> String {
    if count == 0 {
        return "No trials".to_string();
    }
    format!("Trial {}/{}  ({} marked)", position + 1, count, marked)
}

pub fn mark_text(mark: Option<Mark>) -> String {
    match mark {
        Some(Mark::Frame(frame)) => format!("frame {}", frame),
        Some(Mark::NoFrame) => "no frame".to_string(),
        None => "not marked".to_string(),
    }
}

/// Entry in the trial list; blind mode shows only the position.
pub fn trial_label(index: usize, relative_path: &str, blind: bool, mark: Option<Mark>) -> String {
    let check = if mark.is_some() { "✔" } else { "  " };
    if blind {
        format!("{} Trial {}", check, index + 1)
    } else {
        format!("{} {}", check, relative_path)
    }
}
