//! Well-known label/annotation keys on the produced `Application`
//! (spec.md §6 "Produced Application shape").

pub const LABEL_NAME: &str = "addons.oam.dev/name";
pub const LABEL_VERSION: &str = "addons.oam.dev/version";
pub const LABEL_REGISTRY: &str = "addons.oam.dev/registry";

pub const ANNOTATION_COMPONENT_DEFINITIONS: &str = "addon.oam.dev/componentDefinitions";
pub const ANNOTATION_TRAIT_DEFINITIONS: &str = "addon.oam.dev/traitDefinitions";
pub const ANNOTATION_POLICY_DEFINITIONS: &str = "addon.oam.dev/policyDefinitions";
pub const ANNOTATION_WORKFLOW_STEP_DEFINITIONS: &str = "addon.oam.dev/workflowStepDefinitions";
pub const ANNOTATION_AUXILIARY_OUTPUT_OF: &str = "addon.oam.dev/auxiliary-output-of";

/// Fixed namespace every produced `Application` lives in.
pub const APPLICATION_NAMESPACE: &str = "vela-system";

/// Deterministic `Application` name for an addon (spec.md §3 invariants).
pub fn application_name(addon_name: &str) -> String {
    format!("addon-{}", addon_name)
}

/// Deterministic parameter secret name/key (spec.md §6).
pub fn parameter_secret_name(addon_name: &str) -> String {
    format!("addon-secret-{}", addon_name)
}

pub const PARAMETER_SECRET_KEY: &str = "addonParameterDataKey";
