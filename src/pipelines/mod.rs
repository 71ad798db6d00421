pub mod bead_assembly;
