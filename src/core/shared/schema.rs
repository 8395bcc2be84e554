diesel::table! {
    company_objectives (id) {
        id -> Int8,
        name -> Varchar,
        start_date -> Date,
        end_date -> Date,
        achievement -> Int4,
    }
}

diesel::table! {
    company_key_results (id) {
        id -> Int8,
        company_objective_id -> Int8,
        name -> Varchar,
        current_value -> Float8,
        goal_value -> Float8,
        confidence_level -> Float8,
        achievement -> Int4,
        comment -> Text,
        timestamp -> Timestamptz,
    }
}

diesel::table! {
    company_key_result_histories (id) {
        id -> Int8,
        company_key_result_id -> Int8,
        current_value -> Float8,
        goal_value -> Float8,
        confidence_level -> Float8,
        achievement -> Int4,
        comment -> Text,
        timestamp -> Timestamptz,
    }
}

diesel::table! {
    business_units (id) {
        id -> Int8,
        name -> Varchar,
    }
}

diesel::table! {
    business_unit_objectives (id) {
        id -> Int8,
        business_unit_id -> Int8,
        name -> Varchar,
        start_date -> Date,
        end_date -> Date,
        achievement -> Int4,
    }
}

diesel::table! {
    business_unit_key_results (id) {
        id -> Int8,
        business_unit_objective_id -> Int8,
        company_key_result_ref -> Nullable<Int8>,
        name -> Varchar,
        current_value -> Float8,
        goal_value -> Float8,
        confidence_level -> Float8,
        achievement -> Int4,
        comment -> Text,
        timestamp -> Timestamptz,
    }
}

diesel::table! {
    business_unit_key_result_histories (id) {
        id -> Int8,
        business_unit_key_result_id -> Int8,
        current_value -> Float8,
        goal_value -> Float8,
        confidence_level -> Float8,
        achievement -> Int4,
        comment -> Text,
        timestamp -> Timestamptz,
    }
}

diesel::table! {
    roles (id) {
        id -> Int8,
        name -> Varchar,
    }
}

diesel::table! {
    privileges (id) {
        id -> Int8,
        name -> Varchar,
    }
}

diesel::table! {
    role_privileges (role_id, privilege_id) {
        role_id -> Int8,
        privilege_id -> Int8,
    }
}

diesel::table! {
    okr_users (id) {
        id -> Int8,
        username -> Varchar,
        name -> Varchar,
        surname -> Varchar,
        role_id -> Nullable<Int8>,
        business_unit_id -> Nullable<Int8>,
    }
}

diesel::joinable!(company_key_results -> company_objectives (company_objective_id));
diesel::joinable!(company_key_result_histories -> company_key_results (company_key_result_id));
diesel::joinable!(business_unit_objectives -> business_units (business_unit_id));
diesel::joinable!(business_unit_key_results -> business_unit_objectives (business_unit_objective_id));
diesel::joinable!(business_unit_key_results -> company_key_results (company_key_result_ref));
diesel::joinable!(business_unit_key_result_histories -> business_unit_key_results (business_unit_key_result_id));
diesel::joinable!(role_privileges -> roles (role_id));
diesel::joinable!(role_privileges -> privileges (privilege_id));
diesel::joinable!(okr_users -> roles (role_id));
diesel::joinable!(okr_users -> business_units (business_unit_id));

diesel::allow_tables_to_appear_in_same_query!(
    company_objectives,
    company_key_results,
    company_key_result_histories,
    business_units,
    business_unit_objectives,
    business_unit_key_results,
    business_unit_key_result_histories,
    roles,
    privileges,
    role_privileges,
    okr_users,
);
