/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the package2 verification pipeline and the boot
    configuration validator.

--*/
#![cfg_attr(not(feature = "std"), no_std)]

mod bootconfig;
mod verifier;

pub use bootconfig::BootConfigValidator;
pub use verifier::{
    Package2VerificationEnv, Package2Verifier, VerifiedPackage2, VersionPolicy,
};
