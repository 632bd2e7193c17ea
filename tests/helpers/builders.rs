use cdattg::entities::{
    class, instructor, instructor_class_binding, learner_class_binding, person, shift, site, user,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Builder for creating test persons
pub struct PersonBuilder {
    document: String,
    first_name: String,
    first_surname: String,
}

impl PersonBuilder {
    pub fn new(document: &str) -> Self {
        Self {
            document: document.to_string(),
            first_name: "Test".to_string(),
            first_surname: document.to_string(),
        }
    }

    pub fn named(mut self, first_name: &str, first_surname: &str) -> Self {
        self.first_name = first_name.to_string();
        self.first_surname = first_surname.to_string();
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> person::Model {
        person::ActiveModel {
            document_number: Set(self.document),
            first_name: Set(self.first_name),
            second_name: Set(None),
            first_surname: Set(self.first_surname),
            second_surname: Set(None),
            email: Set(None),
            active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create test person")
    }
}

/// Builder for creating test user accounts
pub struct UserBuilder {
    email: String,
    person_id: Option<i32>,
    active: bool,
}

impl UserBuilder {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            person_id: None,
            active: true,
        }
    }

    pub fn for_person(mut self, person_id: i32) -> Self {
        self.person_id = Some(person_id);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> user::Model {
        user::ActiveModel {
            email: Set(self.email),
            active: Set(self.active),
            person_id: Set(self.person_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create test user")
    }
}

/// Builder for creating test shifts
pub struct ShiftBuilder {
    name: String,
    start: Option<String>,
    end: Option<String>,
}

impl ShiftBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: None,
            end: None,
        }
    }

    pub fn window(mut self, start: &str, end: &str) -> Self {
        self.start = Some(start.to_string());
        self.end = Some(end.to_string());
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> shift::Model {
        shift::ActiveModel {
            name: Set(self.name),
            start_time: Set(self.start),
            end_time: Set(self.end),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create test shift")
    }
}

/// Builder for creating test classes
pub struct ClassBuilder {
    code: String,
    site_id: Option<i32>,
    shift_id: Option<i32>,
}

impl ClassBuilder {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            site_id: None,
            shift_id: None,
        }
    }

    pub fn at_site(mut self, site_id: i32) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn with_shift(mut self, shift_id: i32) -> Self {
        self.shift_id = Some(shift_id);
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> class::Model {
        class::ActiveModel {
            code: Set(self.code),
            lead_instructor_id: Set(None),
            site_id: Set(self.site_id),
            shift_id: Set(self.shift_id),
            venue: Set(None),
            start_date: Set(None),
            end_date: Set(None),
            active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create test class")
    }
}

pub async fn create_site(db: &DatabaseConnection, name: &str) -> site::Model {
    site::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create test site")
}

pub async fn create_instructor(db: &DatabaseConnection, person_id: i32) -> instructor::Model {
    instructor::ActiveModel {
        person_id: Set(person_id),
        active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create test instructor")
}

pub async fn bind_instructor(
    db: &DatabaseConnection,
    instructor_id: i32,
    class_id: i32,
) -> instructor_class_binding::Model {
    instructor_class_binding::ActiveModel {
        instructor_id: Set(instructor_id),
        class_id: Set(class_id),
        competency_id: Set(None),
        start_date: Set(None),
        end_date: Set(None),
        hour_budget: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to bind test instructor")
}

pub async fn enroll_learner(
    db: &DatabaseConnection,
    person_id: i32,
    class_id: i32,
) -> learner_class_binding::Model {
    learner_class_binding::ActiveModel {
        person_id: Set(person_id),
        class_id: Set(class_id),
        active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to enroll test learner")
}
