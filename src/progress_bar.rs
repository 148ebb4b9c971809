// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Progress bar for the optimization iterations.
use std::borrow::Cow;

use indicatif::{ProgressBar, ProgressStyle};
use log::{log_enabled, Level};

const TEMPLATE: &str = "{bar:40} {pos}/{len} {msg} ({eta})";

/// A progress bar counting the iterations of an optimizer.
///
/// The bar is hidden when the `Info` logging level is disabled.
#[derive(Debug, Clone)]
pub struct IterationBar(ProgressBar);

impl IterationBar {
    /// Returns an [IterationBar] of given length.
    pub fn new(length: u64) -> Self {
        let bp = if log_enabled!(Level::Info) {
            ProgressBar::new(length)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE) {
            bp.set_style(style);
        }
        IterationBar(bp)
    }

    /// Sets a message to the [IterationBar].
    pub fn set_message(&self, msg: impl Into<Cow<'static, str>>) {
        self.0.set_message(msg);
    }

    /// Increments the progress bar by one.
    pub fn inc(&self) {
        self.0.inc(1);
    }

    /// Sets the progress bar to finished.
    pub fn finish(&self) {
        self.0.finish_and_clear();
    }

    /// Hides the progress bar temporarily.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.0.suspend(f)
    }
}
