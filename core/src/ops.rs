//! Bundled typed operations.
//!
//! A representative slice of the backend's routes, declared with
//! [`operation!`](crate::operation). Each entry also appears in the
//! crate's `routes.json` so table-driven callers see the same descriptors.

use serde_json::Value;

use crate::operation;
use crate::types::*;

operation!(
    /// Exchange client credentials for an access token.
    Login, "login", POST "/login", LoginRequest => AccessToken, Login
);
operation!(
    /// Obtain a token acting on behalf of another user.
    LoginUser, "login_user", POST "/login/{user_id}", LoginUserRequest => AccessToken, Sudo
);
operation!(
    /// Invalidate the current access token.
    Logout, "logout", DELETE "/logout", LogoutRequest => Value, Logout
);
operation!(
    /// The user owning the current credential.
    Me, "me", GET "/user", MeRequest => User
);
operation!(GetUser, "user", GET "/users/{user_id}", UserRequest => User);
operation!(SearchUsers, "search_users", GET "/users/search", SearchUsersRequest => Vec<User>);
operation!(CreateUser, "create_user", POST "/users", CreateUserRequest => User);
operation!(UpdateUser, "update_user", PATCH "/users/{user_id}", UpdateUserRequest => User);
operation!(DeleteUser, "delete_user", DELETE "/users/{user_id}", DeleteUserRequest => Value);
operation!(AllGroups, "all_groups", GET "/groups", AllGroupsRequest => Vec<Group>);
operation!(
    DeleteGroupFromGroup,
    "delete_group_from_group",
    DELETE "/groups/{group_id}/groups/{deleting_group_id}",
    DeleteGroupFromGroupRequest => Value
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Operation, OperationDescriptor, OperationTable};

    fn bundled() -> Vec<OperationDescriptor> {
        vec![
            Login::DESCRIPTOR,
            LoginUser::DESCRIPTOR,
            Logout::DESCRIPTOR,
            Me::DESCRIPTOR,
            GetUser::DESCRIPTOR,
            SearchUsers::DESCRIPTOR,
            CreateUser::DESCRIPTOR,
            UpdateUser::DESCRIPTOR,
            DeleteUser::DESCRIPTOR,
            AllGroups::DESCRIPTOR,
            DeleteGroupFromGroup::DESCRIPTOR,
        ]
    }

    #[test]
    fn typed_operations_match_route_list() {
        let table = OperationTable::builtin().unwrap();
        for descriptor in bundled() {
            assert_eq!(table.get(&descriptor.id), Some(&descriptor), "{}", descriptor.id);
        }
    }

    #[test]
    fn typed_templates_are_well_formed() {
        for descriptor in bundled() {
            assert!(descriptor.template().is_ok(), "{}", descriptor.id);
        }
    }
}
