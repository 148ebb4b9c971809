// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Cells of the discretized network and their triangular fundamental diagram.
use crate::error::{AdjointError, AdjointResult};

/// A cell of the network.
///
/// The flow-density relationship of the cell is a triangular fundamental diagram:
///
/// - the *demand* (sending function) is `min(v * rho, max_flow)`;
/// - the *supply* (receiving function) is `min(w * (jam_density - rho), max_flow)`;
///
/// where `v` is the free-flow speed, `w` is the congestion-wave speed and `rho` is the total
/// density of the cell.
///
/// Cells with an infinite jam density (origin buffers and destination sinks) have a constant
/// supply equal to their maximum flow.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    length: f64,
    free_flow_speed: f64,
    congestion_wave_speed: f64,
    jam_density: f64,
    max_flow: f64,
}

impl Cell {
    /// Creates a new road [Cell].
    ///
    /// Returns an error if one of the parameters is not positive and finite.
    pub fn new(
        length: f64,
        free_flow_speed: f64,
        congestion_wave_speed: f64,
        jam_density: f64,
        max_flow: f64,
    ) -> AdjointResult<Self> {
        for (name, value) in [
            ("length", length),
            ("free-flow speed", free_flow_speed),
            ("congestion-wave speed", congestion_wave_speed),
            ("jam density", jam_density),
            ("maximum flow", max_flow),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(AdjointError::Configuration(format!(
                    "The {name} of a cell must be positive and finite (got {value})"
                )));
            }
        }
        Ok(Cell {
            length,
            free_flow_speed,
            congestion_wave_speed,
            jam_density,
            max_flow,
        })
    }

    /// Creates the buffer cell of an origin: an unbounded storage releasing vehicles at most at
    /// `max_flow`.
    pub fn buffer(length: f64, free_flow_speed: f64, max_flow: f64) -> AdjointResult<Self> {
        let mut cell = Self::new(length, free_flow_speed, 1.0, 1.0, max_flow)?;
        cell.congestion_wave_speed = 0.0;
        cell.jam_density = f64::INFINITY;
        Ok(cell)
    }

    /// Creates the sink cell of a destination: it accepts any flow and never sends vehicles.
    pub fn sink(length: f64) -> AdjointResult<Self> {
        if !(length.is_finite() && length > 0.0) {
            return Err(AdjointError::Configuration(format!(
                "The length of a cell must be positive and finite (got {length})"
            )));
        }
        Ok(Cell {
            length,
            free_flow_speed: 0.0,
            congestion_wave_speed: 0.0,
            jam_density: f64::INFINITY,
            max_flow: f64::MAX,
        })
    }

    /// Returns the length of the cell.
    pub const fn length(&self) -> f64 {
        self.length
    }

    /// Returns the free-flow speed of the cell.
    pub const fn free_flow_speed(&self) -> f64 {
        self.free_flow_speed
    }

    /// Returns the congestion-wave speed of the cell.
    pub const fn congestion_wave_speed(&self) -> f64 {
        self.congestion_wave_speed
    }

    /// Returns the jam density of the cell.
    pub const fn jam_density(&self) -> f64 {
        self.jam_density
    }

    /// Returns the maximum flow of the cell.
    pub const fn max_flow(&self) -> f64 {
        self.max_flow
    }

    /// Returns `true` if the cell can store an unbounded number of vehicles.
    pub fn is_unbounded(&self) -> bool {
        self.jam_density.is_infinite()
    }

    /// Returns the demand of the cell for the given total density.
    pub fn demand(&self, total_density: f64) -> f64 {
        (self.free_flow_speed * total_density).min(self.max_flow)
    }

    /// Returns the supply of the cell for the given total density.
    pub fn supply(&self, total_density: f64) -> f64 {
        if self.is_unbounded() {
            self.max_flow
        } else {
            (self.congestion_wave_speed * (self.jam_density - total_density)).min(self.max_flow)
        }
    }

    /// Returns the derivative of the demand with respect to the total density.
    pub fn demand_derivative(&self, total_density: f64) -> f64 {
        if self.free_flow_speed * total_density < self.max_flow {
            self.free_flow_speed
        } else {
            0.0
        }
    }

    /// Returns the derivative of the supply with respect to the total density.
    pub fn supply_derivative(&self, total_density: f64) -> f64 {
        if !self.is_unbounded()
            && self.congestion_wave_speed * (self.jam_density - total_density) < self.max_flow
        {
            -self.congestion_wave_speed
        } else {
            0.0
        }
    }

    /// Returns the critical density of the cell, i.e., the density at which the demand reaches
    /// the maximum flow.
    pub fn critical_density(&self) -> f64 {
        self.max_flow / self.free_flow_speed
    }
}
