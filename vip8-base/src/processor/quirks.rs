/// Deviations from the baseline instruction semantics,
/// reflecting how historical interpreters differed.
///
/// Everything is disabled by default, which is the behavior
/// most ROMs written for modern interpreters expect.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Quirks {
    /// `8XY6`/`8XYE` copy `VY` into `VX` before shifting, as the COSMAC VIP did.
    pub shift_copies_vy: bool,
    /// `FX55`/`FX65` leave `I` incremented past the last register transferred.
    pub load_store_increments_i: bool,
    /// `FX55`/`FX65` only transfer `V0` up to `VX` instead of the whole register file.
    pub load_store_up_to_x: bool,
    /// `BNNN` jumps to `NNN + V0` instead of `XNN + VX`.
    pub jump_offset_uses_v0: bool,
}
