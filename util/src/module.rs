//! Cyclic module interface
//!
//! Every cyclic module in `swerve_exec` (currently the drivetrain controller)
//! implements [`State`], so the executable can treat them uniformly: build
//! once at startup, then process once per control tick.

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// The module's internal state.
pub trait State: Sized {
    /// Data required to build the module (parameters, injected hardware).
    type InitData;
    /// An error which can occur during initialisation. Initialisation errors
    /// are fatal, the module must not be used if `init` fails.
    type InitError;

    /// Data required for cyclic processing.
    type InputData;
    /// Data produced by cyclic processing.
    type OutputData;
    /// A report on the status of the cyclic processing.
    type StatusReport;
    /// An error which can occur during cyclic processing.
    type ProcError;

    /// Initialise the module.
    ///
    /// # Outputs
    /// - On success the initialised module.
    /// - On error an `InitError` instance.
    fn init(init_data: Self::InitData) -> Result<Self, Self::InitError>;

    /// Main module processing function, called once per control tick.
    ///
    /// Processing must never block on I/O.
    ///
    /// # Outputs
    /// - On success a tuple of the output data and status report.
    /// - On error a `ProcError` instance.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
