pub mod attendance_session;
pub mod class;
pub mod evidence;
pub mod instructor;
pub mod instructor_class_binding;
pub mod learner_attendance;
pub mod learner_class_binding;
pub mod person;
pub mod policy_rule;
pub mod shift;
pub mod site;
pub mod user;

pub use attendance_session::Entity as AttendanceSession;
pub use class::Entity as Class;
pub use evidence::Entity as Evidence;
pub use instructor::Entity as Instructor;
pub use instructor_class_binding::Entity as InstructorClassBinding;
pub use learner_attendance::Entity as LearnerAttendance;
pub use learner_class_binding::Entity as LearnerClassBinding;
pub use person::Entity as Person;
pub use policy_rule::Entity as PolicyRule;
pub use shift::Entity as Shift;
pub use site::Entity as Site;
pub use user::Entity as User;
