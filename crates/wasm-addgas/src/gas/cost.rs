//! Cost policies for the injected gas call.

use crate::disasm::Instruction;

/// Decides how much gas a function body charges on entry.
pub trait CostModel {
    /// Returns the amount passed to the gas import for a body, given the body's
    /// instructions as they were before instrumentation.
    fn body_cost(&self, instructions: &[Instruction]) -> i32;
}

/// Charges the same amount for every body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantCost(pub i32);

impl CostModel for ConstantCost {
    fn body_cost(&self, _instructions: &[Instruction]) -> i32 {
        self.0
    }
}

/// Charges `unit` per instruction in the body, saturating at `i32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerInstructionCost {
    pub unit: i32,
}

impl CostModel for PerInstructionCost {
    fn body_cost(&self, instructions: &[Instruction]) -> i32 {
        i32::try_from(instructions.len())
            .unwrap_or(i32::MAX)
            .saturating_mul(self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::disassemble;

    #[test]
    fn constant_ignores_the_body() {
        let body = disassemble(&[0x01, 0x01, 0x0b]).unwrap();
        assert_eq!(ConstantCost(7).body_cost(body.instructions()), 7);
    }

    #[test]
    fn per_instruction_counts_every_instruction() {
        // nop nop end
        let body = disassemble(&[0x01, 0x01, 0x0b]).unwrap();
        assert_eq!(PerInstructionCost { unit: 2 }.body_cost(body.instructions()), 6);
        assert_eq!(
            PerInstructionCost { unit: i32::MAX }.body_cost(body.instructions()),
            i32::MAX
        );
    }
}
