//! Permission names, reserved refs and section names

// Ref namespaces
pub const REFS: &str = "refs/";
pub const REFS_HEADS: &str = "refs/heads/";
pub const REFS_FOR: &str = "refs/for/";
pub const REFS_CHANGES: &str = "refs/changes/";
pub const REFS_CONFIG: &str = "refs/meta/config";

/// Pattern covering every ref of a project
pub const ALL_REFS: &str = "refs/*";

// Distinguished section names
pub const GLOBAL_CAPABILITIES: &str = "GLOBAL_CAPABILITIES";
pub const PROJECT_CAPABILITIES: &str = "PROJECT_CAPABILITIES";

// Core ref permissions
pub const ABANDON: &str = "abandon";
pub const ADD_PATCH_SET: &str = "addPatchSet";
pub const CREATE: &str = "create";
pub const CREATE_SIGNED_TAG: &str = "createSignedTag";
pub const CREATE_TAG: &str = "createTag";
pub const DELETE: &str = "delete";
pub const DELETE_CHANGES: &str = "deleteChanges";
pub const DELETE_OWN_CHANGES: &str = "deleteOwnChanges";
pub const EDIT_HASHTAGS: &str = "editHashtags";
pub const EDIT_TOPIC_NAME: &str = "editTopicName";
pub const FORGE_AUTHOR: &str = "forgeAuthor";
pub const FORGE_COMMITTER: &str = "forgeCommitter";
pub const FORGE_SERVER: &str = "forgeServerAsCommitter";
pub const OWNER: &str = "owner";
pub const PUSH: &str = "push";
pub const PUSH_MERGE: &str = "pushMerge";
pub const READ: &str = "read";
pub const REBASE: &str = "rebase";
pub const REVERT: &str = "revert";
pub const SUBMIT: &str = "submit";
pub const SUBMIT_AS: &str = "submitAs";
pub const TOGGLE_WIP_STATE: &str = "toggleWipState";
pub const VIEW_PRIVATE_CHANGES: &str = "viewPrivateChanges";

const REF_PERMISSIONS: &[&str] = &[
    ABANDON, ADD_PATCH_SET, CREATE, CREATE_SIGNED_TAG, CREATE_TAG, DELETE, DELETE_CHANGES,
    DELETE_OWN_CHANGES, EDIT_HASHTAGS, EDIT_TOPIC_NAME, FORGE_AUTHOR, FORGE_COMMITTER,
    FORGE_SERVER, OWNER, PUSH, PUSH_MERGE, READ, REBASE, REVERT, SUBMIT, SUBMIT_AS,
    TOGGLE_WIP_STATE, VIEW_PRIVATE_CHANGES,
];

// Label permissions carry a vote range
pub const LABEL: &str = "label-";
pub const LABEL_AS: &str = "labelAs-";
pub const REMOVE_LABEL: &str = "removeLabel-";
pub const PLUGIN: &str = "plugin-";

// Global capabilities
pub const ADMINISTRATE_SERVER: &str = "administrateServer";
pub const BATCH_CHANGES_LIMIT: &str = "batchChangesLimit";
pub const QUERY_LIMIT: &str = "queryLimit";

const GLOBAL_CAPABILITY_NAMES: &[&str] = &[
    "accessDatabase", ADMINISTRATE_SERVER, BATCH_CHANGES_LIMIT, "createAccount", "createGroup",
    "createProject", "emailReviewers", "flushCaches", "killTask", "maintainServer",
    "modifyAccount", "priority", QUERY_LIMIT, "readAs", "runAs", "runGC", "streamEvents",
    "viewAccess", "viewAllAccounts", "viewCaches", "viewConnections", "viewPlugins",
    "viewQueue",
];

/// True for a permission that may appear in a ref-scoped section
pub fn is_ref_permission(name: &str) -> bool {
    REF_PERMISSIONS.contains(&name) || is_label_permission(name) || is_plugin_name(name)
}

/// True for a name accepted in the global capabilities section
pub fn is_global_capability(name: &str) -> bool {
    GLOBAL_CAPABILITY_NAMES.contains(&name) || is_plugin_name(name)
}

/// Label permissions and the ranged global capabilities carry min..max
pub fn has_range(name: &str) -> bool {
    is_label_permission(name) || name == QUERY_LIMIT || name == BATCH_CHANGES_LIMIT
}

fn is_label_permission(name: &str) -> bool {
    [LABEL, LABEL_AS, REMOVE_LABEL]
        .iter()
        .any(|p| name.strip_prefix(p).is_some_and(|label| !label.is_empty()))
}

fn is_plugin_name(name: &str) -> bool {
    name.strip_prefix(PLUGIN).is_some_and(|rest| !rest.is_empty())
}

// Defaults
pub const ALL_PROJECTS: &str = "All-Projects";
pub const DEFAULT_MESSAGE: &str = "Modify access rules";
pub const DEFAULT_REVIEW_MESSAGE: &str = "Review access change";

// Maximum parent chain depth (prevents infinite loops)
pub const MAX_INHERITANCE_DEPTH: usize = 10;
