//! A [`Regulator`] built on a PID controller.

use pid::Pid;

use crate::hal::Regulator;

/// PID gains.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidParameters {
    /// PID P-component.
    pub p: f32,
    /// PID I-component.
    pub i: f32,
    /// PID D-component.
    pub d: f32,
}

/// PID regulator, working in sensor units and PWM ticks.
pub struct PidRegulator {
    /// The gains to (re-)build the controller with.
    parameters: PidParameters,
    /// The controller.
    pid: Pid<f32>,
}

impl PidRegulator {
    /// Create a new regulator with the given gains.
    pub fn new(parameters: PidParameters) -> Self {
        Self {
            parameters,
            pid: Pid::new(0.0, 0.0),
        }
    }

    /// The regulator's gains.
    pub fn parameters(&self) -> PidParameters {
        self.parameters
    }
}

impl Regulator for PidRegulator {
    fn compute(&mut self, setpoint: u16, measured: u16, max_output: u16) -> u16 {
        let limit = max_output as f32;

        self.pid.output_limit = limit;
        self.pid
            .setpoint(setpoint as f32)
            .p(self.parameters.p, limit)
            .i(self.parameters.i, limit)
            .d(self.parameters.d, limit);

        let control_output = self.pid.next_control_output(measured as f32);

        // Mitigate downward setpoint steps to cause undershoot.
        if control_output.output <= 0.0 && control_output.i < 0.0 {
            self.pid.reset_integral_term();
        }

        trace!(
            "PID: P {}, I {}, D {} => {}",
            control_output.p,
            control_output.i,
            control_output.d,
            control_output.output
        );

        control_output.output.clamp(0.0, limit) as u16
    }

    fn reset(&mut self) {
        self.pid = Pid::new(0.0, 0.0);
    }
}
